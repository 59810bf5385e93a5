#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = markpad_lib::run(args).await?;
    std::process::exit(code);
}
