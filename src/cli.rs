// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command-line surface.
//!
//! Leading global flags, a verb with optional short alias, and whatever
//! trailing arguments the verb forwards to its external tool. The short
//! `-h` is deliberately the host override, so clap's automatic help short
//! flag is disabled at the top level and only `--help` remains.

use crate::{
    commands::{self, generations, push, Context},
    config::Config,
    runner::Runner,
};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::{ffi::OsString, path::PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    disable_help_flag = true,
    override_usage = "\n  nixdot [options] <command> [args]...\n  nixdot <-i|-A|-q|-e|-p> [nix-env args]...",
    subcommand_help_heading = "Commands",
    version
)]
pub struct Cli {
    /// Print external invocations instead of executing them.
    #[arg(short = 'd', long = "dryrun")]
    pub dry_run: bool,

    /// Flake directory to act on, bypassing resolution.
    #[arg(short = 'f', long = "flake", value_name = "path")]
    pub flake: Option<PathBuf>,

    /// Host attribute to build instead of the configured default.
    #[arg(short = 'h', long = "host", value_name = "name")]
    pub host: Option<String>,

    /// Print help.
    #[arg(long, action = ArgAction::HelpLong)]
    pub help: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Dispatch the parsed verb.
    pub fn run(self) -> Result<()> {
        let ctx = Context {
            runner: Runner::new(self.dry_run),
            config: Config::load()?,
            flake_override: self.flake,
            host_override: self.host,
        };

        match self.command {
            Command::Rebuild(opts) => commands::rebuild(&ctx, &opts.args),
            Command::Test(opts) => commands::test(&ctx, &opts.args),
            Command::Rollback => commands::rollback(&ctx),
            Command::Vm => commands::vm(&ctx),
            Command::Update(opts) => commands::update(&ctx, &opts.inputs),
            Command::Upgrade(opts) => commands::upgrade(&ctx, &opts.args),
            Command::Search(opts) => commands::search(&ctx, &opts.terms),
            Command::Show => commands::show(&ctx),
            Command::Check(opts) => commands::check(&ctx, &opts.args),
            Command::Gc => commands::gc(&ctx),
            Command::Generations(opts) => match opts.action.unwrap_or(GenerationsCommand::List) {
                GenerationsCommand::List => generations::list(&ctx),
                GenerationsCommand::Diff { generation } => {
                    generations::diff(&ctx, generation.as_str())
                }
                GenerationsCommand::Remove { generations: gens } => {
                    generations::remove(&ctx, &gens)
                }
                GenerationsCommand::Rollback { generation } => {
                    generations::rollback(&ctx, generation.as_str())
                }
            },
            Command::Push(opts) => push::push(&ctx, opts.target.as_str(), opts.action.as_deref()),
            Command::Swap(opts) => commands::swap(&ctx, &opts.paths),
            Command::Config => commands::effective_config(&ctx),
            Command::External(argv) => commands::extension(&ctx, &argv),
        }?;

        Ok(())
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Rebuild the configuration and switch into it.
    #[command(alias = "re", override_usage = "nixdot [options] rebuild [rebuild args]...")]
    Rebuild(PassthroughOptions),

    /// Rebuild and activate without a bootloader entry.
    #[command(alias = "t", override_usage = "nixdot [options] test [rebuild args]...")]
    Test(PassthroughOptions),

    /// Switch back to the previous generation.
    Rollback,

    /// Build a virtual machine running the configuration.
    Vm,

    /// Update flake inputs.
    #[command(alias = "u", override_usage = "nixdot [options] update [input]...")]
    Update(UpdateOptions),

    /// Update all inputs, then rebuild and switch.
    #[command(alias = "up", override_usage = "nixdot [options] upgrade [rebuild args]...")]
    Upgrade(PassthroughOptions),

    /// Search nixpkgs for packages.
    #[command(alias = "s", override_usage = "nixdot [options] search [term]...")]
    Search(SearchOptions),

    /// Show the flake's output layout.
    #[command(alias = "sh")]
    Show,

    /// Evaluate the flake's checks.
    #[command(alias = "ch", override_usage = "nixdot [options] check [check args]...")]
    Check(PassthroughOptions),

    /// Collect garbage from the store.
    Gc,

    /// Manage system profile generations.
    #[command(alias = "gen")]
    Generations(GenerationsOptions),

    /// Deploy the configuration onto a remote host.
    #[command(override_usage = "nixdot [options] push <target> [action]")]
    Push(PushOptions),

    /// Toggle paths between store links and writable copies.
    #[command(override_usage = "nixdot [options] swap <path>...")]
    Swap(SwapOptions),

    /// Print the effective configuration.
    Config,

    /// Run a nixdot extension found on PATH.
    #[command(external_subcommand)]
    External(Vec<OsString>),
}

#[derive(Parser, Clone, Debug)]
pub struct PassthroughOptions {
    /// Arguments forwarded to the underlying tool verbatim.
    #[arg(value_name = "arg", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
pub struct UpdateOptions {
    /// Inputs to update; all of them when omitted.
    #[arg(value_name = "input")]
    pub inputs: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
pub struct SearchOptions {
    /// Search terms handed to the package search.
    #[arg(value_name = "term")]
    pub terms: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
pub struct GenerationsOptions {
    #[command(subcommand)]
    pub action: Option<GenerationsCommand>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum GenerationsCommand {
    /// List all generations of the system profile.
    List,

    /// Diff referenced store paths against the live system.
    Diff {
        #[arg(value_name = "generation")]
        generation: String,
    },

    /// Remove the named generations.
    Remove {
        #[arg(required = true, value_name = "generation")]
        generations: Vec<String>,
    },

    /// Roll back to a specific generation.
    Rollback {
        #[arg(value_name = "generation")]
        generation: String,
    },
}

#[derive(Parser, Clone, Debug)]
pub struct PushOptions {
    /// Remote host to deploy onto.
    #[arg(value_name = "target")]
    pub target: String,

    /// Rebuild action to run on the remote; defaults to test.
    #[arg(value_name = "action")]
    pub action: Option<String>,
}

#[derive(Parser, Clone, Debug)]
pub struct SwapOptions {
    /// Files or directories to toggle.
    #[arg(required = true, value_name = "path")]
    pub paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;
    use std::mem::discriminant;

    #[test_case("rebuild", "re"; "rebuild")]
    #[test_case("test", "t"; "test")]
    #[test_case("update", "u"; "update")]
    #[test_case("upgrade", "up"; "upgrade")]
    #[test_case("search", "s"; "search")]
    #[test_case("show", "sh"; "show")]
    #[test_case("check", "ch"; "check")]
    #[test_case("generations", "gen"; "generations")]
    #[test]
    fn alias_resolves_to_canonical_verb(canonical: &str, alias: &str) -> anyhow::Result<()> {
        let full = Cli::try_parse_from(["nixdot", canonical])?;
        let short = Cli::try_parse_from(["nixdot", alias])?;
        assert_eq!(discriminant(&full.command), discriminant(&short.command));
        Ok(())
    }

    #[test]
    fn leading_global_flags_parse() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "nixdot", "-d", "-f", "/tmp/flake", "-h", "carbon", "rebuild",
        ])?;

        assert!(cli.dry_run);
        assert_eq!(cli.flake, Some(PathBuf::from("/tmp/flake")));
        assert_eq!(cli.host, Some("carbon".to_string()));

        Ok(())
    }

    #[test]
    fn short_h_is_the_host_override() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["nixdot", "-h", "carbon", "show"])?;
        assert_eq!(cli.host, Some("carbon".to_string()));
        assert!(matches!(cli.command, Command::Show));
        Ok(())
    }

    #[test]
    fn rebuild_forwards_hyphenated_arguments() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["nixdot", "rebuild", "--upgrade", "--verbose"])?;
        match cli.command {
            Command::Rebuild(opts) => assert_eq!(opts.args, vec!["--upgrade", "--verbose"]),
            other => panic!("expected rebuild, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn unknown_verb_is_captured_for_extension_probing() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["nixdot", "frobnicate", "--level", "11"])?;
        match cli.command {
            Command::External(argv) => {
                assert_eq!(argv, vec!["frobnicate", "--level", "11"]);
            }
            other => panic!("expected external capture, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn generations_sub_verbs_parse() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["nixdot", "gen", "diff", "12"])?;
        match cli.command {
            Command::Generations(opts) => {
                assert!(matches!(
                    opts.action,
                    Some(GenerationsCommand::Diff { generation }) if generation == "12"
                ));
            }
            other => panic!("expected generations, got {other:?}"),
        }

        let cli = Cli::try_parse_from(["nixdot", "gen"])?;
        match cli.command {
            Command::Generations(opts) => assert!(opts.action.is_none()),
            other => panic!("expected generations, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn swap_requires_at_least_one_path() {
        assert!(Cli::try_parse_from(["nixdot", "swap"]).is_err());
    }

    #[test]
    fn push_takes_target_and_optional_action() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["nixdot", "push", "carbon", "switch"])?;
        match cli.command {
            Command::Push(opts) => {
                assert_eq!(opts.target, "carbon");
                assert_eq!(opts.action, Some("switch".to_string()));
            }
            other => panic!("expected push, got {other:?}"),
        }
        Ok(())
    }
}
