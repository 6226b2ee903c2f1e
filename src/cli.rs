use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan, apply and tear down scoped infrastructure", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command; they override `stratum.toml`.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (defaults to stratum.toml in the config directory)
    #[arg(long, global = true, env = "STRATUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend state file
    #[arg(long, global = true, env = "STRATUM_BACKEND_STATE")]
    pub backend_state: Option<PathBuf>,

    /// Maximum concurrent backend operations
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Per-step timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub step_timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the graph, validate, and preview the changes
    Plan(PlanArgs),

    /// Run precondition checks only
    Validate(DocumentArgs),

    /// Plan, confirm, and converge the backend to the declared state
    Apply(ApplyArgs),

    /// Tear down declared resources in reverse dependency order
    Destroy(DestroyArgs),

    /// Resolve a name through a network scope's private resolver
    Resolve(ResolveArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    /// Declared-state document (TOML/JSON file or a directory of them)
    pub document: PathBuf,

    /// Environment-specific overrides document
    #[arg(long)]
    pub overrides: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,

    /// Skip the confirmation prompts
    #[arg(short = 'y', long)]
    pub auto_approve: bool,

    /// Permit replace steps (immutable field changes)
    #[arg(long)]
    pub allow_destructive: bool,

    /// Refuse to apply unless the plan matches this fingerprint
    #[arg(long, value_name = "FP")]
    pub expect_fingerprint: Option<String>,
}

#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,

    /// Only remove these resources (kind/scope/name) and their dependents
    #[arg(long = "target", value_name = "KEY")]
    pub targets: Vec<String>,

    /// Purge soft-deletable resources (irreversible)
    #[arg(long)]
    pub purge: bool,

    /// Required together with --purge
    #[arg(long, requires = "purge")]
    pub confirm_purge: bool,

    /// Skip the confirmation prompts
    #[arg(short = 'y', long)]
    pub auto_approve: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Name to resolve
    pub name: String,

    /// Network scope the resolver is bound to
    #[arg(long)]
    pub network: String,

    /// DNS-over-HTTPS endpoint used for recursion
    #[arg(long, value_name = "URL")]
    pub upstream: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_destroy_flags() {
        let cli = Cli::parse_from([
            "stratum",
            "destroy",
            "infra.toml",
            "--target",
            "network/ScopeA/vnet1",
            "--purge",
            "--confirm-purge",
            "-j",
            "2",
        ]);
        let Command::Destroy(args) = cli.command else {
            panic!("expected destroy");
        };
        assert_eq!(args.targets, vec!["network/ScopeA/vnet1".to_string()]);
        assert!(args.purge && args.confirm_purge);
        assert_eq!(cli.global.jobs, Some(2));
    }

    #[test]
    fn test_confirm_purge_requires_purge() {
        let result = Cli::try_parse_from(["stratum", "destroy", "infra.toml", "--confirm-purge"]);
        assert!(result.is_err());
    }
}
