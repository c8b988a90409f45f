// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: module catalog directory
fn modules_dir_arg() -> Arg {
    Arg::new("modules_dir")
        .long("modules-dir")
        .value_name("PATH")
        .default_value("/modules")
        .help("Module catalog directory")
}

/// Common argument: global hooks directory
fn global_hooks_dir_arg() -> Arg {
    Arg::new("global_hooks_dir")
        .long("global-hooks-dir")
        .value_name("PATH")
        .default_value("/global-hooks")
        .help("Global hooks directory")
}

/// Common argument: deployment namespace
fn namespace_arg() -> Arg {
    Arg::new("namespace")
        .long("namespace")
        .default_value("")
        .help("Namespace releases are deployed into")
}

/// Common argument: configuration document path
fn config_doc_arg() -> Arg {
    Arg::new("config_doc")
        .long("config-doc")
        .value_name("PATH")
        .help("Path to the configuration document (JSON)")
}

fn build_cli() -> Command {
    Command::new("helmsman")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Cluster add-on controller driving modules through a helm-style package manager")
        .subcommand_required(false)
        .subcommand(
            Command::new("run")
                .about("Start the controller event loop")
                .arg(modules_dir_arg())
                .arg(global_hooks_dir_arg())
                .arg(namespace_arg())
                .arg(config_doc_arg()),
        )
        .subcommand(
            Command::new("discover")
                .about("One-shot discovery: print the modules state and exit")
                .arg(modules_dir_arg())
                .arg(global_hooks_dir_arg())
                .arg(namespace_arg())
                .arg(config_doc_arg()),
        )
        .subcommand(
            Command::new("values")
                .about("Print merged values and their checksum for a scope")
                .arg(Arg::new("scope").required(true).help("\"global\" or a module name"))
                .arg(modules_dir_arg())
                .arg(global_hooks_dir_arg())
                .arg(namespace_arg())
                .arg(config_doc_arg()),
        )
        .subcommand(
            Command::new("hooks")
                .about("List registered hooks per binding")
                .arg(Arg::new("module").help("Module name; global hooks if omitted"))
                .arg(modules_dir_arg())
                .arg(global_hooks_dir_arg())
                .arg(namespace_arg())
                .arg(config_doc_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("helmsman.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
        return;
    }

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
