/// 日志工具模块
///
/// 提供日志初始化以及格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志
///
/// 默认级别为 info，可通过 `RUST_LOG` 覆盖。重复调用是安全的（测试中会多次调用）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发数
/// - `chunk_size`: 进度块大小
pub fn log_startup(max_concurrent: usize, chunk_size: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 发票 PDF 一致性比对");
    info!("📊 最大并发数: {}, 进度块大小: {}", max_concurrent, chunk_size);
    info!("{}", "=".repeat(60));
}

/// 记录批处理清单加载信息
pub fn log_records_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 组待比对的文档", total);
    info!("📋 最多同时比对 {} 组", max_concurrent);
}

/// 记录进度块开始信息
///
/// # 参数
/// - `chunk_num`: 块编号（从1开始）
/// - `total_chunks`: 块总数
/// - `start`: 起始记录编号
/// - `end`: 结束记录编号
/// - `total`: 记录总数
pub fn log_chunk_start(chunk_num: usize, total_chunks: usize, start: usize, end: usize, total: usize) {
    info!("{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 块", chunk_num, total_chunks);
    info!("📄 本块记录: {}-{} / 共 {} 组", start, end, total);
}

/// 记录进度块完成信息
pub fn log_chunk_complete(chunk_num: usize, processed: usize, total: usize, percentage: u8) {
    info!("{}", "─".repeat(60));
    info!(
        "✓ 第 {} 块完成: 已处理 {}/{} ({}%)",
        chunk_num, processed, total, percentage
    );
}

/// 打印最终统计信息
///
/// # 参数
/// - `passed`/`failed`/`errored`: 各结果数量
/// - `total`: 总数
pub fn print_final_stats(passed: usize, failed: usize, errored: usize, total: usize) {
    info!("{}", "=".repeat(60));
    info!("📊 全部比对完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 通过: {}/{}", passed, total);
    info!("❌ 不一致: {}", failed);
    info!("⚠️ 出错: {}", errored);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
