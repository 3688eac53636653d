use gdrived::daemon::{resolve_data_dir, DaemonRuntime};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliArgs {
    data_path: Option<String>,
    block_sync: bool,
    help: bool,
}

fn parse_cli_args<I>(args: I) -> anyhow::Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--datapath" => {
                parsed.data_path = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--datapath requires a value"))?,
                );
            }
            "--blocksync" => parsed.block_sync = true,
            "--help" | "-h" => parsed.help = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = parse_cli_args(std::env::args())?;
    if args.help {
        println!("Usage: gdrived [--datapath <dir>] [--blocksync]");
        println!("  --datapath <dir>  data directory (default ~/.gdrived)");
        println!("  --blocksync       run a full blocking sync before starting");
        return Ok(());
    }

    let data_dir = resolve_data_dir(args.data_path)?;
    let daemon = DaemonRuntime::bootstrap(data_dir).await?;
    daemon.run(args.block_sync).await
}
