#[tokio::main]
async fn main() {
    if let Err(e) = medhistory_lib::run().await {
        eprintln!("medhistory: {e}");
        std::process::exit(1);
    }
}
