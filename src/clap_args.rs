/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Checks that the container manager enforces CPU limits and guarantees", long_about = None)]
pub struct Args {
    /// Verbose mode (-v, --verbose)
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to a config file, defaults to ./schedcheck.toml when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduling suite
    Run {
        /// Only run the named scenarios
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// List the scenarios this host would run
    List,

    /// Write an example config to ./schedcheck.toml
    Init,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_a_scenario_filter() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "schedcheck",
            "-v",
            "-c",
            "ci.toml",
            "run",
            "--only",
            "normal_one_core,rt_one_core",
        ])?;

        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("ci.toml")));
        match args.command {
            Commands::Run { only } => assert_eq!(only, ["normal_one_core", "rt_one_core"]),
            cmd => anyhow::bail!("unexpected command {:?}", cmd),
        }
        Ok(())
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["schedcheck"]).is_err());
    }
}
