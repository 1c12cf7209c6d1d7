// src/main.rs

use devsync::{cli, run};

#[tokio::main]
async fn main() {
    match run(cli::parse()).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("devsync error: {err:?}");
            std::process::exit(1);
        }
    }
}
