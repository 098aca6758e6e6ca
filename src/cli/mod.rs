// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI module for MLC-CORE commands.
//!
//! ## Usage
//!
//! ```bash
//! mlc-core-cli load [--reload] [--path P]   # Sync artifacts to the cache
//! mlc-core-cli classify PATH...             # Show how files are handled
//! mlc-core-cli status [--json]              # Dump the serving registry
//! mlc-core-cli health                       # Probe every replica
//! mlc-core-cli config show|defaults|validate
//! ```

pub mod config_cmd;
pub mod load_cmd;
pub mod registry_cmd;

pub use load_cmd::{run_classify, run_load};
pub use registry_cmd::{run_health, run_status};

/// Options of the `load` subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadArgs {
    pub reload: bool,
    pub path: Option<String>,
}

impl LoadArgs {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = LoadArgs::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--reload" => parsed.reload = true,
                "--path" => {
                    let value = iter.next().ok_or("--path requires a value")?;
                    parsed.path = Some(value.clone());
                }
                other => return Err(format!("unknown load option: {}", other)),
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_args_parse() {
        let parsed = LoadArgs::parse(&args(&["--reload", "--path", "/srv/model"])).unwrap();
        assert!(parsed.reload);
        assert_eq!(parsed.path.as_deref(), Some("/srv/model"));
        assert_eq!(LoadArgs::parse(&[]).unwrap(), LoadArgs::default());
    }

    #[test]
    fn test_load_args_errors() {
        assert!(LoadArgs::parse(&args(&["--path"])).is_err());
        assert!(LoadArgs::parse(&args(&["--force"])).is_err());
    }
}
