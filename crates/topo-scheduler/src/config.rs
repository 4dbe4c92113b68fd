use std::path::PathBuf;

use clap::Parser;
use utils::version;

#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "LISTEN_ADDR",
        default_value = "0.0.0.0:3767",
        help = "HTTP listen address of the scheduler extender"
    )]
    pub listen_addr: String,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "TOPO_SCHEDULER_NAME",
        default_value = "topo-scheduler",
        help = "Extender name reported in logs"
    )]
    pub scheduler_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_arguments() {
        let cli = Cli::try_parse_from(["topo-scheduler"]).expect("should parse");
        if std::env::var_os("LISTEN_ADDR").is_none() {
            assert_eq!(cli.listen_addr, "0.0.0.0:3767");
        }
        if std::env::var_os("TOPO_SCHEDULER_NAME").is_none() {
            assert_eq!(cli.scheduler_name, "topo-scheduler");
        }
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "topo-scheduler",
            "--listen-addr",
            "127.0.0.1:9000",
            "--kubeconfig",
            "/tmp/kubeconfig",
            "--scheduler-name",
            "gpu-topo",
        ])
        .expect("should parse");

        assert_eq!(cli.listen_addr, "127.0.0.1:9000");
        assert_eq!(cli.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
        assert_eq!(cli.scheduler_name, "gpu-topo");
    }
}
