//! CLI flags (§6, §4.13). Supersedes `redis/config.rs`'s hand-parsed
//! `redis.conf` directives with a `clap`-derived struct, keeping the
//! teacher's "fail loudly, exit non-zero" idiom for semantic validation
//! that clap itself can't express (port range, `--dir` existence).

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "emberdb-server", about = "A Redis-compatible in-memory data server")]
pub struct CliArgs {
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(long)]
    pub dir: Option<PathBuf>,

    #[arg(long, default_value = "dump.rdb")]
    pub dbfilename: String,

    #[arg(long, default_value_t = false)]
    pub appendonly: bool,

    /// `"<host> <port>"`, e.g. `--replicaof "127.0.0.1 6379"`.
    #[arg(long)]
    pub replicaof: Option<String>,
}

pub struct Config {
    pub port: u16,
    pub bind: IpAddr,
    pub dir: Option<PathBuf>,
    pub dbfilename: String,
    pub appendonly: bool,
    pub replicaof: Option<(String, u16)>,
}

impl Config {
    /// Parses argv and validates semantically; any failure is printed to
    /// stderr and exits the process non-zero (§6 CLI contract), matching
    /// the teacher's `load_err` style rather than panicking.
    pub fn from_args() -> Config {
        let args = CliArgs::parse();
        Config::validate(args).unwrap_or_else(|err| {
            eprintln!("*** FATAL CONFIG ERROR ***\n{err}");
            std::process::exit(1);
        })
    }

    fn validate(args: CliArgs) -> Result<Config, String> {
        let bind: IpAddr = args.bind.parse().map_err(|_| format!("invalid --bind address '{}'", args.bind))?;

        if let Some(dir) = &args.dir {
            if !dir.is_dir() {
                return Err(format!("--dir '{}' does not exist or is not a directory", dir.display()));
            }
        }

        let replicaof = match args.replicaof {
            None => None,
            Some(s) => {
                let mut parts = s.split_whitespace();
                let host = parts.next().ok_or_else(|| "--replicaof requires \"<host> <port>\"".to_string())?;
                let port: u16 = parts
                    .next()
                    .ok_or_else(|| "--replicaof requires \"<host> <port>\"".to_string())?
                    .parse()
                    .map_err(|_| "--replicaof port must be a u16".to_string())?;
                Some((host.to_string(), port))
            }
        };

        Ok(Config {
            port: args.port,
            bind,
            dir: args.dir,
            dbfilename: args.dbfilename,
            appendonly: args.appendonly,
            replicaof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicaof_splits_host_and_port() {
        let args = CliArgs {
            port: 6379,
            bind: "127.0.0.1".into(),
            dir: None,
            dbfilename: "dump.rdb".into(),
            appendonly: false,
            replicaof: Some("10.0.0.1 6380".into()),
        };
        let cfg = Config::validate(args).unwrap();
        assert_eq!(cfg.replicaof, Some(("10.0.0.1".to_string(), 6380)));
    }

    #[test]
    fn bad_bind_address_rejected() {
        let args = CliArgs {
            port: 6379,
            bind: "not-an-ip".into(),
            dir: None,
            dbfilename: "dump.rdb".into(),
            appendonly: false,
            replicaof: None,
        };
        assert!(Config::validate(args).is_err());
    }
}
