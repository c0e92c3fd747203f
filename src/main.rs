use std::path::{Path, PathBuf};

use extension_gatekeeper::cli::{BlockAction, Cli, Command, RemoteArgs};
use extension_gatekeeper::client::HttpBlocklistClient;
use extension_gatekeeper::gatekeeper::extension::FileCandidate;
use extension_gatekeeper::gatekeeper::{Gatekeeper, LogNotifier, SelectionDecision};
use extension_gatekeeper::logging::{init_tracing, log_startup};
use extension_gatekeeper::web::start_server;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _trace_provider = init_tracing(cli.enable_otel_logs, cli.debug)?;
    log_startup(cli.debug);

    match cli.command {
        Command::Serve(args) => {
            args.validate()?;
            start_server(args.server_config()).await
        }
        Command::Check { remote, files } => check(&remote, &files).await,
        Command::Block { remote, action } => block(&remote, action).await,
    }
}

async fn connect(remote: &RemoteArgs) -> Result<Gatekeeper<HttpBlocklistClient, LogNotifier>> {
    let client = HttpBlocklistClient::with_timeout(&remote.server, remote.timeout())?;
    Ok(Gatekeeper::connect(client, LogNotifier).await?)
}

fn candidate(path: &Path) -> FileCandidate {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let candidate = FileCandidate::new(name);
    match std::fs::metadata(path) {
        Ok(metadata) => candidate.with_size(metadata.len()),
        Err(_) => candidate,
    }
}

async fn check(remote: &RemoteArgs, files: &[PathBuf]) -> Result<()> {
    let gatekeeper = connect(remote).await?;
    let blocklist = gatekeeper.compute_blocklist();
    let candidates = files.iter().map(PathBuf::as_path).map(candidate).collect();

    match gatekeeper.filter_selection(candidates, &blocklist) {
        SelectionDecision::Proceed(accepted) => {
            for file in accepted {
                match file.size {
                    Some(size) => println!("{}\t{size}", file.name),
                    None => println!("{}", file.name),
                }
            }
            Ok(())
        }
        SelectionDecision::Cancel => Err("every selected file has a blocked extension".into()),
    }
}

async fn block(remote: &RemoteArgs, action: BlockAction) -> Result<()> {
    let gatekeeper = connect(remote).await?;

    match action {
        BlockAction::List => {
            for blocked in gatekeeper.with_state(|state| state.blocked_extensions()) {
                println!("{:<6} {blocked}", blocked.origin);
            }
        }
        BlockAction::Add { ext } => {
            let added = gatekeeper.add_custom_extension(&ext).await?;
            println!("added {added}");
        }
        BlockAction::Remove { ext } => {
            gatekeeper.remove_custom_extension(&ext.to_lowercase()).await?;
            println!("removed {}", ext.to_lowercase());
        }
        BlockAction::Fixed { ext, off } => {
            gatekeeper.toggle_fixed_extension(&ext, !off).await?;
            println!("{} {}", if off { "unblocked" } else { "blocked" }, ext.to_lowercase());
        }
    }

    Ok(())
}
