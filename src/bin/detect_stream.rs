// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/detect_stream.rs - 连续帧目标检测程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use shanan_flow::{
  FromUrl,
  config::{self, PipelineConfig},
  input::InputWrapper,
  model::ModelWrapper,
  output::{DiscardOutput, OutputError, OutputWrapper},
  task::{CancellationToken, PipelineTask, Task},
};

/// 连续帧目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 onnx:///models/yolo11n.onnx
  /// 需要以 `--features onnx_model` 编译，默认构建不包含推理后端
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  /// - 单张图片: image:///data/bus.jpg
  /// - 图片目录: folder:///data/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  /// - 日志: log:
  /// - 图片: image:///tmp/out.png?font=/usr/share/fonts/DejaVuSans.ttf
  /// - 目录记录: folder:///data/record?record=name&always
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = config::DEFAULT_CONF_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = config::DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 采集与处理之间的队列容量
  #[arg(long, default_value_t = config::DEFAULT_QUEUE_CAPACITY, value_name = "SIZE")]
  pub queue_size: usize,
  /// 模型类别数
  #[arg(long, default_value_t = config::DEFAULT_NUM_CLASSES, value_name = "COUNT")]
  pub num_classes: usize,
  /// 模型输入边长
  #[arg(long, default_value_t = config::DEFAULT_INPUT_SIZE, value_name = "PIXELS")]
  pub input_size: u32,
  /// 连续读取失败多少次后结束
  #[arg(long, default_value_t = config::DEFAULT_MAX_READ_FAILURES, value_name = "COUNT")]
  pub max_read_failures: usize,
  /// 最大处理帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub max_frames: Option<u64>,
}

impl Args {
  fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      queue_capacity: self.queue_size,
      conf_threshold: self.confidence,
      iou_threshold: self.nms_threshold,
      input_width: self.input_size,
      input_height: self.input_size,
      num_classes: self.num_classes,
      max_read_failures: self.max_read_failures,
      max_frames: self.max_frames,
    }
  }
}

fn open_output(url: &Url) -> Result<OutputWrapper> {
  match OutputWrapper::from_url(url) {
    Ok(output) => Ok(output),
    Err(OutputError::SchemeMismatch(scheme)) => Err(anyhow::anyhow!("不支持的输出方式: {}", scheme)),
    Err(e) => {
      error!("无法打开输出 {}: {}，丢弃所有结果继续处理", url, e);
      Ok(OutputWrapper::Discard(DiscardOutput))
    }
  }
}

fn install_interrupt_handler(cancel: CancellationToken) -> Result<()> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    cancel.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理器")
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);

  let task = PipelineTask::new(args.pipeline_config()).context("参数无效")?;
  install_interrupt_handler(task.cancellation().clone())?;

  let input = InputWrapper::from_url(&args.input).context("无法创建输入源")?;
  info!("正在加载模型...");
  let model = ModelWrapper::from_url(&args.model).context("无法加载模型")?;
  info!("模型加载完成");
  let output = open_output(&args.output)?;

  let report = task.run_task(input, model, output)?;

  info!("处理完成!");
  info!("总帧数: {}", report.frames_processed);
  info!("总检测数: {}", report.total_detections);
  if report.frames_failed > 0 {
    warn!("{} 帧未能完成检测", report.frames_failed);
  }
  if !report.source_opened {
    anyhow::bail!("输入源无法打开: {}", args.input);
  }

  Ok(())
}
