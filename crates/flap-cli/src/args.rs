use crate::types::{LogLevel, TimeZoneArg, UnparsedArg};
use clap::{Args, Parser, Subcommand};
use flap_runtime::Target;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flap")]
#[command(about = "Trace file access patterns with bpftrace", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: $FLAP_CONFIG, ./flap.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the tracers against a target until they exit or are interrupted")]
    Trace {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, requires = "cgroup", help = "Only processes of the cgroup with this command name")]
        filter_command: Option<String>,

        #[arg(short, long, default_value = "output", help = "Session output directory (wiped first)")]
        output: PathBuf,

        #[arg(long, help = "Skip decoding the captured output")]
        no_decode: bool,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    #[command(about = "Decode a finished session directory into NDJSON")]
    Decode {
        #[arg(short, long, help = "Session directory containing meta.json")]
        dir: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,
    },
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false, id = "target")]
pub struct TargetArgs {
    #[arg(long, help = "Command line to launch under the tracers")]
    pub execute: Option<String>,

    #[arg(long, help = "Attach to a running process id")]
    pub pid: Option<String>,

    #[arg(long, help = "Trace every process with this command name")]
    pub command: Option<String>,

    #[arg(long, help = "Trace every process in this cgroup id")]
    pub cgroup: Option<String>,
}

impl TargetArgs {
    /// `filter_command` narrows a cgroup target and is ignored otherwise
    pub fn into_target(self, filter_command: Option<String>) -> Option<Target> {
        let TargetArgs {
            execute,
            pid,
            command,
            cgroup,
        } = self;

        match (execute, pid, command, cgroup, filter_command) {
            (Some(cmd), ..) => Some(Target::Execute(cmd)),
            (_, Some(pid), ..) => Some(Target::Pid(pid)),
            (_, _, Some(name), ..) => Some(Target::Command(name)),
            (_, _, _, Some(cgroup), Some(command)) => {
                Some(Target::CgroupCommand { cgroup, command })
            }
            (_, _, _, Some(cgroup), None) => Some(Target::Cgroup(cgroup)),
            _ => None,
        }
    }
}

/// Decode settings that override the `[decode]` config section
#[derive(Debug, Clone, Default, Args)]
pub struct DecodeArgs {
    #[arg(long, help = "Handling of lines that are not tracer events")]
    pub unparsed: Option<UnparsedArg>,

    #[arg(long, help = "Time zone of decoded timestamps")]
    pub timezone: Option<TimeZoneArg>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("flap").chain(args.iter().copied()))
    }

    fn target_of(cli: Cli) -> Option<Target> {
        match cli.command {
            Commands::Trace {
                target,
                filter_command,
                ..
            } => target.into_target(filter_command),
            Commands::Decode { .. } => None,
        }
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_targets() {
        assert_eq!(
            target_of(parse(&["trace", "--pid", "42"]).unwrap()),
            Some(Target::Pid("42".to_string()))
        );
        assert_eq!(
            target_of(parse(&["trace", "--execute", "ls -l"]).unwrap()),
            Some(Target::Execute("ls -l".to_string()))
        );
        assert_eq!(
            target_of(parse(&["trace", "--cgroup", "7", "--filter-command", "nginx"]).unwrap()),
            Some(Target::CgroupCommand {
                cgroup: "7".to_string(),
                command: "nginx".to_string()
            })
        );
    }

    #[test]
    fn test_target_is_required_and_exclusive() {
        assert!(parse(&["trace"]).is_err());
        assert!(parse(&["trace", "--pid", "1", "--command", "cat"]).is_err());
        assert!(parse(&["trace", "--filter-command", "cat"]).is_err());
    }

    #[test]
    fn test_decode_overrides() {
        let cli = parse(&["decode", "--dir", "out", "--unparsed", "drop", "--timezone", "utc"]).unwrap();
        match cli.command {
            Commands::Decode { dir, decode } => {
                assert_eq!(dir, PathBuf::from("out"));
                assert_eq!(decode.unparsed, Some(UnparsedArg::Drop));
                assert_eq!(decode.timezone, Some(TimeZoneArg::Utc));
            }
            Commands::Trace { .. } => panic!("expected decode"),
        }
    }
}
