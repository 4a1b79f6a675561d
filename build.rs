// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_SETTINGS_PATH: &str = "repo/settings.json";

fn settings_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value(DEFAULT_SETTINGS_PATH)
        .help("Settings file")
}

fn build_cli() -> Command {
    Command::new("debrepo")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Debrepo Contributors")
        .about("Build APT repositories from folders of .deb packages")
        .subcommand_required(false)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log debug output"),
        )
        .subcommand(
            Command::new("build")
                .about("Build the repository index and publish patched packages")
                .arg(settings_arg())
                .arg(
                    Arg::new("unattended")
                        .short('u')
                        .long("unattended")
                        .action(ArgAction::SetTrue)
                        .help("Never prompt; ordering faults abort the build"),
                )
                .arg(
                    Arg::new("changelog_notes")
                        .long("changelog-notes")
                        .value_name("TEXT")
                        .help("Notes recorded for every new version"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_name("N")
                        .help("Seed for the default featured package pick"),
                )
                .arg(
                    Arg::new("view_json")
                        .long("view-json")
                        .value_name("PATH")
                        .help("Write the rendering view as JSON to this path"),
                ),
        )
        .subcommand(
            Command::new("scaffold")
                .about("Create the meta folder of a package group")
                .arg(
                    Arg::new("group")
                        .required(true)
                        .help("Group folder name under the packages folder"),
                )
                .arg(settings_arg()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the control file embedded in a .deb")
                .arg(Arg::new("archive").required(true).help("Path to the package file")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("debrepo.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
