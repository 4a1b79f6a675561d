// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use debrepo::operator::{Operator, Unattended};
use debrepo::packages::deb;
use debrepo::repository::{self, group};
use debrepo::{OrderingFault, RepoConfig, Version, config};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::{self, File};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Magic bytes of the `ar` container every .deb uses
const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

#[derive(Parser)]
#[command(name = "debrepo")]
#[command(
    author,
    version,
    about = "Build APT repositories from folders of .deb packages",
    long_about = None
)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the repository index and publish patched packages
    Build {
        /// Settings file
        #[arg(short, long, default_value = config::DEFAULT_SETTINGS_PATH)]
        config: PathBuf,
        /// Never prompt; ordering faults abort the build
        #[arg(short, long)]
        unattended: bool,
        /// Notes recorded for every new version (implies no notes prompt)
        #[arg(long, value_name = "TEXT")]
        changelog_notes: Option<String>,
        /// Seed for the default featured package pick
        #[arg(long)]
        seed: Option<u64>,
        /// Write the rendering view as JSON to this path
        #[arg(long, value_name = "PATH")]
        view_json: Option<PathBuf>,
    },
    /// Create the meta folder of a package group
    Scaffold {
        /// Group folder name under the packages folder
        group: String,
        /// Settings file
        #[arg(short, long, default_value = config::DEFAULT_SETTINGS_PATH)]
        config: PathBuf,
    },
    /// Print the control file embedded in a .deb
    Inspect {
        /// Path to the package file
        archive: PathBuf,
    },
}

/// Asks questions on a terminal
struct TerminalOperator<R, W> {
    input: R,
    output: W,
    /// Fixed notes used instead of prompting
    notes: Option<String>,
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    fn new(input: R, output: W, notes: Option<String>) -> Self {
        Self {
            input,
            output,
            notes,
        }
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        if writeln!(self.output, "{}", question).and_then(|_| self.output.flush()).is_err() {
            return None;
        }

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn accept_ordering_fault(&mut self, group: &str, fault: &OrderingFault) -> bool {
        warn!("{}", fault);
        let question = format!("Changelog of {} is out of order. Stop and fix it? (Y/n)", group);
        // Anything but an explicit no stops the build
        match self.ask(&question) {
            Some(answer) => matches!(answer.trim().to_lowercase().as_str(), "n" | "no" | "non"),
            None => false,
        }
    }

    fn changelog_notes(&mut self, group: &str, version: &Version) -> Option<String> {
        if let Some(notes) = &self.notes {
            return Some(notes.clone());
        }
        self.ask(&format!(
            "Please input your changelog changes for {} version {}:",
            group, version
        ))
    }
}

/// Check the file starts like an `ar` archive
fn is_deb_archive(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 8];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == AR_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn load_config(path: &Path) -> Result<RepoConfig> {
    info!("Using settings from {}", path.display());
    Ok(RepoConfig::load(path)?)
}

/// Name shown in a scaffolded description: the newest build's `Name`, else the folder name
fn group_display_name(config: &RepoConfig, group_name: &str) -> String {
    repository::discover_groups(config)
        .into_iter()
        .find(|found| found.name == group_name)
        .and_then(|found| {
            group::PackageGroup::construct(
                config,
                &found.name,
                &found.archives,
                &mut Unattended::new(),
                &mut Vec::new(),
            )
            .ok()
        })
        .map(|g| g.canonical_manifest().name().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| group_name.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Some(Commands::Build {
            config: settings,
            unattended,
            changelog_notes,
            seed,
            view_json,
        }) => {
            let config = load_config(&settings)?;

            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let report = if unattended {
                let mut operator = match changelog_notes {
                    Some(notes) => Unattended::with_notes(notes),
                    None => Unattended::new(),
                };
                repository::build_repository(&config, &mut operator, &mut rng)?
            } else {
                let stdin = io::stdin();
                let mut operator =
                    TerminalOperator::new(stdin.lock(), io::stderr(), changelog_notes);
                repository::build_repository(&config, &mut operator, &mut rng)?
            };

            if let Some(path) = view_json {
                fs::write(&path, serde_json::to_string_pretty(&report.view)?)?;
                info!("Wrote rendering view to {}", path.display());
            }

            println!("Packages: {}", report.packages_path().display());
            println!("Release: {}", report.release_path().display());
            println!("Groups: {}", report.view.groups.len());
            if !report.skipped.is_empty() {
                println!("\nSkipped:");
                for skipped in &report.skipped {
                    match &skipped.artifact {
                        Some(artifact) => {
                            println!("  {}/{}: {}", skipped.group, artifact, skipped.reason)
                        }
                        None => println!("  {}: {}", skipped.group, skipped.reason),
                    }
                }
            }
            Ok(())
        }
        Some(Commands::Scaffold {
            group: group_name,
            config: settings,
        }) => {
            let config = load_config(&settings)?;
            let display_name = group_display_name(&config, &group_name);
            let meta_dir = group::scaffold_group_meta(&config, &group_name, &display_name)?;
            println!("Meta folder ready at: {}", meta_dir.display());
            Ok(())
        }
        Some(Commands::Inspect { archive }) => {
            if !is_deb_archive(&archive)? {
                return Err(anyhow::anyhow!(
                    "{} is not a .deb archive",
                    archive.display()
                ));
            }
            print!("{}", deb::extract_manifest_text(&archive)?);
            Ok(())
        }
        None => {
            println!("Debrepo APT Repository Builder v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'debrepo --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fault() -> OrderingFault {
        OrderingFault {
            path: "changelog.json".to_string(),
            position: 1,
            provided: "1.0".to_string(),
            expected: "1.1".to_string(),
        }
    }

    fn operator(input: &str) -> TerminalOperator<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalOperator::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), None)
    }

    #[test]
    fn test_cli_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "debrepo",
            "build",
            "--unattended",
            "--changelog-notes",
            "Fixes",
            "--seed",
            "3",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Build {
                config: settings,
                unattended,
                changelog_notes,
                seed,
                view_json,
            }) => {
                assert_eq!(settings, PathBuf::from(config::DEFAULT_SETTINGS_PATH));
                assert!(unattended);
                assert_eq!(changelog_notes.as_deref(), Some("Fixes"));
                assert_eq!(seed, Some(3));
                assert_eq!(view_json, None);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_ordering_fault_continues_only_on_no() {
        for answer in ["n\n", "No\n", "non\n"] {
            assert!(operator(answer).accept_ordering_fault("tweak", &fault()), "{}", answer);
        }
        for answer in ["\n", "y\n", "yes\n", "nope\n", ""] {
            assert!(!operator(answer).accept_ordering_fault("tweak", &fault()), "{:?}", answer);
        }
    }

    #[test]
    fn test_changelog_notes_prompt() {
        let version = Version::parse("1.1").unwrap();
        let mut terminal = operator("Fixed a crash\r\n");
        assert_eq!(
            terminal.changelog_notes("tweak", &version),
            Some("Fixed a crash".to_string())
        );
        let prompt = String::from_utf8(terminal.output).unwrap();
        assert!(prompt.contains("tweak version 1.1"));

        assert_eq!(operator("").changelog_notes("tweak", &version), None);
    }

    #[test]
    fn test_fixed_notes_skip_prompt() {
        let version = Version::parse("1.1").unwrap();
        let mut terminal =
            TerminalOperator::new(Cursor::new(Vec::new()), Vec::new(), Some("Fixes".to_string()));
        assert_eq!(terminal.changelog_notes("tweak", &version), Some("Fixes".to_string()));
        assert!(terminal.output.is_empty());
    }

    #[test]
    fn test_is_deb_archive() {
        let temp_file = tempfile::NamedTempFile::with_suffix(".deb").unwrap();
        std::fs::write(temp_file.path(), b"!<arch>\ndebian-binary").unwrap();
        assert!(is_deb_archive(temp_file.path()).unwrap());

        std::fs::write(temp_file.path(), [0xED, 0xAB, 0xEE, 0xDB, 0, 0, 0, 0]).unwrap();
        assert!(!is_deb_archive(temp_file.path()).unwrap());

        std::fs::write(temp_file.path(), b"!<ar").unwrap();
        assert!(!is_deb_archive(temp_file.path()).unwrap());
    }
}
