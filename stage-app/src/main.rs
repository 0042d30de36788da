use std::fs;
use std::path::PathBuf;

use stage_config::{AppConfig, ExportScope};
use stage_engine::scene::Scene;
use stage_io::{StageDumper, to_json};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut override_scope: Option<ExportScope> = None;
    let mut override_pretty: Option<bool> = None;
    let mut config_override: Option<PathBuf> = None;
    let mut output_override: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--full" => override_scope = Some(ExportScope::Full),
            "--selection" => override_scope = Some(ExportScope::Selection),
            "--pretty" => override_pretty = Some(true),
            "--compact" => override_pretty = Some(false),
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--output" => {
                let Some(path) = args.next() else {
                    eprintln!("`--output` 需要提供输出文件路径");
                    std::process::exit(1);
                };
                output_override = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);
    info!("启动舞台序列化演示");

    let scope = override_scope.unwrap_or(config.export.scope);
    let pretty = override_pretty.unwrap_or(config.export.pretty);
    let output = output_override.or_else(|| config.export.output.clone());

    let text = match export_demo(scope, pretty) {
        Ok(text) => text,
        Err(err) => {
            error!(error = %err, "导出舞台失败");
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(err) = fs::write(&path, text) {
                error!(path = %path.display(), error = %err, "写入导出文件失败");
                std::process::exit(1);
            }
            info!(path = %path.display(), "已写入导出文件");
        }
        None => println!("{text}"),
    }
}

fn export_demo(scope: ExportScope, pretty: bool) -> Result<String, Box<dyn std::error::Error>> {
    let mut scene = Scene::new();
    let ids = scene.populate_demo()?;

    let record = match scope {
        ExportScope::Full => {
            info!("导出整个舞台");
            StageDumper::new(scene.stage()).dump()?
        }
        ExportScope::Selection => {
            // 选中外层分组与链接节点，分组内的嵌套内容随之导出
            scene.select(ids.group)?;
            scene.select(ids.link)?;
            let roots = scene.selection();
            info!(roots = roots.len(), "导出选中子图");
            StageDumper::new(scene.stage()).dump_selected(&roots)?
        }
    };
    info!(
        entities = record.entities.len(),
        associations = record.associations.len(),
        "导出完成"
    );
    Ok(to_json(&record, pretty)?)
}

/// 显式路径优先，其次自动发现；任何失败都回退到内建默认值。
fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    loaded.unwrap_or_else(|err| {
        warn!(path = %err.path().display(), error = %err, "加载配置失败，使用内建默认值");
        AppConfig::default()
    })
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // 日志写到标准错误，标准输出留给 JSON；重复初始化时保留已有的订阅者
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
