use std::path::PathBuf;

use anyhow::{bail, Result};
use invoice_parity::utils::logging;
use invoice_parity::{App, Config};
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let app = App::initialize(config).await?;

    match args.as_slice() {
        [] => {
            app.run(None).await?;
        }
        ["result", id] => print_json(&app.comparison_detail(id)?)?,
        ["status", job_id] => print_json(&app.job_status(job_id)?)?,
        ["compare", old_ref, new_ref] => print_json(&app.compare_pair(old_ref, new_ref).await?)?,
        ["regions", old_ref, new_ref] => {
            print_json(&app.difference_regions(old_ref, new_ref).await?)?
        }
        [manifest] if !manifest.starts_with('-') => {
            app.run(Some(PathBuf::from(manifest))).await?;
        }
        _ => bail!(
            "用法: invoice_parity [清单.toml] | result <id> | status <job_id> | compare <旧> <新> | regions <旧> <新>"
        ),
    }

    Ok(())
}
