use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about = "NodePool cost-optimization recommendation tool", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute NodePool reconfiguration recommendations for a cluster
    Recommend {
        /// Kubernetes config file path (defaults to the usual kubeconfig discovery)
        #[arg(short, long)]
        config_file: Option<String>,

        /// Engine configuration YAML file (region, headroom, strategy, etc.)
        #[arg(short = 'e', long = "engine-config")]
        engine_config: Option<String>,

        /// Strategy override: aggressive, balanced, conservative, spot-first, right-size
        #[arg(short, long)]
        strategy: Option<String>,

        /// Output format for the printed report
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Use an in-memory demonstration cluster instead of a live connection
        #[arg(long)]
        fixture: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, Debug, Default)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
