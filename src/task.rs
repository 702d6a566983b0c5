// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 采集与推理流水线任务
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

use std::{
  fmt::Display,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::Instant,
};

use tracing::{debug, error, info, warn};

use crate::{
  channel::BoundedFrameChannel,
  config::{ConfigError, PipelineConfig},
  detector::YoloDetector,
  frame::Frame,
  input::FrameSource,
  model::Model,
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 协作式取消标志，克隆后共享同一个状态
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
  Starting,
  Running,
  /// 采集已结束，处理线程继续消费队列中剩余的帧
  Draining,
  Stopped,
}

/// 记录状态迁移，只允许向前推进
struct StateTracker {
  history: Mutex<Vec<PipelineState>>,
}

impl StateTracker {
  fn new() -> Self {
    Self {
      history: Mutex::new(vec![PipelineState::Starting]),
    }
  }

  fn advance(&self, next: PipelineState) {
    let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
    let current = history.last().copied().unwrap_or(PipelineState::Starting);
    if next > current {
      debug!("流水线状态: {:?} -> {:?}", current, next);
      history.push(next);
    }
  }

  fn current(&self) -> PipelineState {
    let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
    history.last().copied().unwrap_or(PipelineState::Starting)
  }

  fn into_history(self) -> Vec<PipelineState> {
    self.history.into_inner().unwrap_or_else(|e| e.into_inner())
  }
}

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
  /// 输入源是否成功打开
  pub source_opened: bool,
  pub frames_read: u64,
  /// 读到但未能进入队列的帧
  pub frames_dropped: u64,
  pub read_failures: u64,
  pub frames_processed: u64,
  pub frames_annotated: u64,
  /// 预处理、推理或解码失败，按未标注帧输出
  pub frames_failed: u64,
  pub output_failures: u64,
  pub total_detections: u64,
  /// 经历过的状态，最后一项为最终状态
  pub states: Vec<PipelineState>,
}

impl PipelineReport {
  pub fn final_state(&self) -> PipelineState {
    self.states.last().copied().unwrap_or(PipelineState::Starting)
  }
}

#[derive(Debug, Default)]
struct ProducerReport {
  source_opened: bool,
  frames_read: u64,
  frames_dropped: u64,
  read_failures: u64,
}

#[derive(Debug, Default)]
struct ConsumerReport {
  frames_processed: u64,
  frames_annotated: u64,
  frames_failed: u64,
  output_failures: u64,
  total_detections: u64,
}

// 任一线程以任何方式退出（包括 panic）时关闭队列，另一端不会永远阻塞
struct CloseOnDrop<'a>(&'a BoundedFrameChannel);

impl Drop for CloseOnDrop<'_> {
  fn drop(&mut self) {
    self.0.close();
  }
}

/// 采集线程与处理线程通过有界队列连接的连续检测任务
///
/// 采集线程从输入源读取帧并写入队列，队列满时阻塞；处理线程依次完成
/// 预处理、推理、解码与 NMS，然后把结果交给输出。单帧失败只会让该帧
/// 以未标注形式输出，不会中断流水线。
#[derive(Debug, Clone)]
pub struct PipelineTask {
  config: PipelineConfig,
  detector: YoloDetector,
  cancel: CancellationToken,
}

impl PipelineTask {
  pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      detector: YoloDetector::from_config(&config),
      config,
      cancel: CancellationToken::new(),
    })
  }

  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn with_detector(mut self, detector: YoloDetector) -> Self {
    self.detector = detector;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  fn produce<I>(&self, mut input: I, channel: &BoundedFrameChannel, state: &StateTracker) -> ProducerReport
  where
    I: FrameSource,
    I::Error: Display,
  {
    let _guard = CloseOnDrop(channel);
    let mut report = ProducerReport::default();

    if let Err(e) = input.open() {
      error!("无法打开输入源: {}", e);
      channel.close();
      return report;
    }
    report.source_opened = true;
    state.advance(PipelineState::Running);
    info!("输入源已打开，开始采集");

    let mut consecutive_failures = 0;
    loop {
      if self.cancel.is_cancelled() {
        warn!("收到取消请求，停止采集");
        break;
      }

      match input.read_frame() {
        Ok(Some(frame)) => {
          consecutive_failures = 0;
          report.frames_read += 1;
          let index = frame.index();
          if !channel.push(frame) {
            report.frames_dropped += 1;
            debug!("队列已关闭，丢弃帧 {}", index);
            break;
          }
        }
        Ok(None) => {
          info!("输入源已结束，共读取 {} 帧", report.frames_read);
          break;
        }
        Err(e) => {
          report.read_failures += 1;
          consecutive_failures += 1;
          warn!("读取帧失败 ({}/{}): {}", consecutive_failures, self.config.max_read_failures, e);
          if consecutive_failures >= self.config.max_read_failures {
            error!("连续读取失败 {} 次，视为输入结束", consecutive_failures);
            break;
          }
        }
      }
    }

    channel.close();
    state.advance(PipelineState::Draining);
    report
  }

  fn consume<M, O>(&self, model: M, mut output: O, channel: &BoundedFrameChannel) -> ConsumerReport
  where
    M: Model,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render,
    O::Error: Display,
  {
    let _guard = CloseOnDrop(channel);
    let mut report = ConsumerReport::default();

    while let Some(frame) = channel.pop() {
      self.process_frame(&frame, &model, &mut output, &mut report);

      if self
        .config
        .max_frames
        .map(|n| report.frames_processed >= n)
        .unwrap_or(false)
      {
        info!("达到指定帧数 {}, 退出处理循环", report.frames_processed);
        self.cancel.cancel();
        break;
      }
    }

    if let Err(e) = output.finish() {
      error!("关闭输出失败: {}", e);
      report.output_failures += 1;
    }
    report
  }

  fn process_frame<M, O>(&self, frame: &Frame, model: &M, output: &mut O, report: &mut ConsumerReport)
  where
    M: Model,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render,
    O::Error: Display,
  {
    let now = Instant::now();
    let rendered = match self.detector.detect(frame, model) {
      Ok(result) => {
        debug!("帧 {} 推理完成，耗时: {:.2?}", frame.index(), now.elapsed());
        report.frames_annotated += 1;
        report.total_detections += result.len() as u64;
        output.render_result(frame, Some(&result))
      }
      Err(e) => {
        warn!("帧 {} 处理失败，按未标注帧输出: {}", frame.index(), e);
        report.frames_failed += 1;
        output.render_result(frame, None)
      }
    };

    if let Err(e) = rendered {
      error!("帧 {} 输出失败: {}", frame.index(), e);
      report.output_failures += 1;
    }
    report.frames_processed += 1;
  }
}

impl<I, M, O> Task<I, M, O> for PipelineTask
where
  I: FrameSource + Send,
  I::Error: Display,
  M: Model + Send,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render + Send,
  O::Error: Display,
{
  type Output = PipelineReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务，队列容量 {}", self.config.queue_capacity);
    let started = Instant::now();
    let channel = BoundedFrameChannel::new(self.config.queue_capacity);
    let state = StateTracker::new();

    let (producer, consumer) = thread::scope(|s| {
      let producer = s.spawn(|| self.produce(input, &channel, &state));
      let consumer = s.spawn(|| self.consume(model, output, &channel));
      (producer.join(), consumer.join())
    });

    let (producer, consumer) = match (producer, consumer) {
      (Ok(producer), Ok(consumer)) => (producer, consumer),
      (producer, _) => {
        channel.close();
        state.advance(PipelineState::Stopped);
        let role = if producer.is_err() { "采集" } else { "处理" };
        return Err(anyhow::anyhow!("{}线程异常退出", role));
      }
    };

    let final_state = state.current();
    if final_state == PipelineState::Starting {
      warn!("流水线未进入运行状态");
    }
    state.advance(PipelineState::Stopped);

    let report = PipelineReport {
      source_opened: producer.source_opened,
      frames_read: producer.frames_read,
      frames_dropped: producer.frames_dropped,
      read_failures: producer.read_failures,
      frames_processed: consumer.frames_processed,
      frames_annotated: consumer.frames_annotated,
      frames_failed: consumer.frames_failed,
      output_failures: consumer.output_failures,
      total_detections: consumer.total_detections,
      states: state.into_history(),
    };

    info!(
      "任务完成: 读取 {} 帧，处理 {} 帧，检测到 {} 个对象，耗时 {:.2?}",
      report.frames_read,
      report.frames_processed,
      report.total_detections,
      started.elapsed()
    );
    Ok(report)
  }
}
