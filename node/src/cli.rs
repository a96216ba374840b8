//! # CLI Interface
//!
//! Defines the command-line argument structure for `vault-node` using
//! `clap` derive. Supports two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};

use vault_ledger::config::{DEFAULT_NAME, DEFAULT_SYMBOL, DEFAULT_TRANSFER_FEE};
use vault_ledger::Principal;

/// Share vault development node.
///
/// Hosts a single vault backed by in-memory asset ledgers for ICP, ckBTC
/// and ckETH, serves its ledger and vault operations over HTTP, and
/// exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "vault-node",
    about = "Share vault development node",
    version,
    propagate_version = true
)]
pub struct VaultNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Display name of the share token.
    #[arg(long, env = "VAULT_NAME", default_value = DEFAULT_NAME)]
    pub name: String,

    /// Ticker symbol of the share token.
    #[arg(long, env = "VAULT_SYMBOL", default_value = DEFAULT_SYMBOL)]
    pub symbol: String,

    /// Flat fee, in share units, burned by every transfer and approval.
    #[arg(long, env = "VAULT_FEE", default_value_t = DEFAULT_TRANSFER_FEE)]
    pub fee: u64,

    /// Principal the vault custodies assets under.
    #[arg(long, env = "VAULT_IDENTITY", default_value = "vault-dev")]
    pub identity: Principal,

    /// Principal recorded as the vault's creator.
    #[arg(long, env = "VAULT_CREATOR", default_value = "creator-dev")]
    pub creator: Principal,

    /// Upper bound on a single collaborator call, in milliseconds.
    /// Unbounded when omitted.
    #[arg(long, env = "VAULT_CALL_TIMEOUT_MS")]
    pub call_timeout_ms: Option<u64>,

    /// Port for the REST API.
    #[arg(long, env = "VAULT_RPC_PORT", default_value_t = 9841)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VAULT_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "VAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Serve `POST /dev/faucet`, which mints test assets on the in-memory
    /// ledgers.
    #[arg(long, env = "VAULT_FAUCET")]
    pub faucet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VaultNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults_parse() {
        let cli = VaultNodeCli::try_parse_from(["vault-node", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.fee, DEFAULT_TRANSFER_FEE);
        assert_eq!(args.identity.as_str(), "vault-dev");
        assert!(args.call_timeout_ms.is_none());
        assert!(!args.faucet);
    }

    #[test]
    fn invalid_principal_is_rejected() {
        let parsed = VaultNodeCli::try_parse_from(["vault-node", "run", "--creator", "not valid!"]);
        assert!(parsed.is_err());
    }
}
