//! Clap command tree definition.

use clap::{value_parser, Arg, Command};

/// Build the `strata-shard` command line.
pub fn build_cli() -> Command {
    Command::new("strata-shard")
        .about("Serve one shard of a Strata workspace over a Unix socket")
        .arg(
            Arg::new("workspace")
                .long("workspace")
                .short('w')
                .help("Workspace directory holding every rank's database and socket")
                .required(true),
        )
        .arg(
            Arg::new("rank")
                .long("rank")
                .short('r')
                .help("Rank of this shard (0-based)")
                .value_parser(value_parser!(u32))
                .required(true),
        )
        .arg(
            Arg::new("shards")
                .long("shards")
                .short('n')
                .help("Total number of shards in the workspace")
                .value_parser(value_parser!(u32).range(1..))
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Config file (default: <workspace>/shard.toml, created if missing)"),
        )
        .arg(
            Arg::new("grace-ms")
                .long("grace-ms")
                .help("After shutdown, wait up to this long for connected clients to finish")
                .value_parser(value_parser!(u64)),
        )
}
