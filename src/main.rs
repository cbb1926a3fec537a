/// Entry point of the hostwatch agent.
///
/// Logging is configured through `RUST_LOG`, everything else through the `HOSTWATCH_*`
/// environment variables (see [`hostwatch::config`]).
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    hostwatch::run().await
}
