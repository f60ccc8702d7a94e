//! Thin binary entrypoint for the beaconforge CLI.

#[tokio::main]
async fn main() {
    let exit_code = beaconforge_cli::run().await;
    std::process::exit(exit_code);
}
