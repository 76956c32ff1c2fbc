#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_engine::run_worker().await {
        eprintln!("exam-engine-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
