use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cancel = CancellationToken::new();

    // ctrl-c cancels in-flight plugin calls before the process exits
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if let Err(err) = configmanager::cli::run_cli(cancel).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
