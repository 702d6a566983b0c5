// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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
  convert::Infallible,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
    mpsc,
  },
  thread,
  time::Duration,
};

use ndarray::Array2;
use thiserror::Error;

use shanan_flow::{
  config::PipelineConfig,
  frame::{Frame, PixelFormat},
  input::{FrameSource, IterInput},
  model::{DetectResult, Model, ModelInput, RawPrediction},
  output::Render,
  task::{CancellationToken, PipelineState, PipelineTask, Task},
};

#[derive(Error, Debug)]
#[error("stub inference failure")]
struct StubError;

/// 每次都输出一个位于画面中心、类别 0、置信度 0.9 的锚点
#[derive(Default)]
struct CenterModel {
  fail_odd_calls: bool,
  calls: AtomicUsize,
}

impl Model for CenterModel {
  type Error = StubError;

  fn infer(&self, input: &ModelInput) -> Result<RawPrediction, Self::Error> {
    assert_eq!(input.shape(), &[1, 3, 64, 64]);
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_odd_calls && call % 2 == 1 {
      return Err(StubError);
    }

    let mut anchors = Array2::<f32>::zeros((1, 84));
    anchors[[0, 0]] = 32.0;
    anchors[[0, 1]] = 32.0;
    anchors[[0, 2]] = 20.0;
    anchors[[0, 3]] = 20.0;
    anchors[[0, 4]] = 0.9;
    Ok(RawPrediction::from(anchors))
  }
}

type Rendered = Arc<Mutex<Vec<(u64, Option<DetectResult>)>>>;

#[derive(Default)]
struct CollectOutput {
  frames: Rendered,
  cancel_after: Option<(usize, CancellationToken)>,
  finished: Arc<AtomicUsize>,
}

impl Render for CollectOutput {
  type Error = Infallible;

  fn render_result(&mut self, frame: &Frame, result: Option<&DetectResult>) -> Result<(), Self::Error> {
    let mut frames = self.frames.lock().unwrap();
    frames.push((frame.index(), result.cloned()));
    if let Some((n, token)) = &self.cancel_after
      && frames.len() >= *n
    {
      token.cancel();
    }
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.finished.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

#[derive(Error, Debug)]
#[error("sink unavailable")]
struct SinkError;

struct FailingOutput;

impl Render for FailingOutput {
  type Error = SinkError;

  fn render_result(&mut self, _frame: &Frame, _result: Option<&DetectResult>) -> Result<(), Self::Error> {
    Err(SinkError)
  }
}

#[derive(Error, Debug)]
#[error("device unavailable")]
struct DeviceError;

/// 打开失败，或者先失败若干次再产生帧
struct FlakySource {
  open_fails: bool,
  failures_before_frames: usize,
  frames: u64,
  reads: usize,
  next_index: u64,
}

impl FrameSource for FlakySource {
  type Error = DeviceError;

  fn open(&mut self) -> Result<(), Self::Error> {
    if self.open_fails { Err(DeviceError) } else { Ok(()) }
  }

  fn read_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    self.reads += 1;
    if self.reads <= self.failures_before_frames {
      return Err(DeviceError);
    }
    if self.next_index >= self.frames {
      return Ok(None);
    }
    let frame = Frame::filled(self.next_index, 64, 64, PixelFormat::Rgb, [0, 0, 0]);
    self.next_index += 1;
    Ok(Some(frame))
  }
}

/// 第 `panic_on` 次读取时 panic
struct PanickingSource {
  panic_on: usize,
  reads: usize,
}

impl FrameSource for PanickingSource {
  type Error = DeviceError;

  fn open(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  fn read_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    self.reads += 1;
    if self.reads == self.panic_on {
      panic!("capture device crashed");
    }
    let index = self.reads as u64 - 1;
    Ok(Some(Frame::filled(index, 64, 64, PixelFormat::Rgb, [0, 0, 0])))
  }
}

fn frames(n: u64) -> IterInput<impl Iterator<Item = Frame> + Send> {
  IterInput::new((0..n).map(|i| Frame::filled(i, 64, 64, PixelFormat::Rgb, [i as u8, 0, 0])))
}

fn config(queue_capacity: usize) -> PipelineConfig {
  PipelineConfig {
    queue_capacity,
    input_width: 64,
    input_height: 64,
    ..Default::default()
  }
}

#[test]
fn every_frame_is_detected_in_order() {
  let output = CollectOutput::default();
  let rendered = output.frames.clone();
  let finished = output.finished.clone();

  let task = PipelineTask::new(config(2)).unwrap();
  let report = task.run_task(frames(10), CenterModel::default(), output).unwrap();

  let rendered = rendered.lock().unwrap();
  assert_eq!(rendered.len(), 10);
  for (i, (index, result)) in rendered.iter().enumerate() {
    assert_eq!(*index, i as u64);
    let result = result.as_ref().unwrap();
    assert_eq!(result.len(), 1);
    let det = &result.items[0];
    assert_eq!(det.class_id, 0);
    assert!((det.confidence - 0.9).abs() < 1e-6);
    assert!((det.bbox.x_min - 22.0).abs() < 1e-3);
    assert!((det.bbox.y_max - 42.0).abs() < 1e-3);
  }

  assert_eq!(finished.load(Ordering::SeqCst), 1);
  assert!(report.source_opened);
  assert_eq!(report.frames_read, 10);
  assert_eq!(report.frames_processed, 10);
  assert_eq!(report.frames_annotated, 10);
  assert_eq!(report.total_detections, 10);
  assert_eq!(
    report.states,
    vec![
      PipelineState::Starting,
      PipelineState::Running,
      PipelineState::Draining,
      PipelineState::Stopped
    ]
  );
}

#[test]
fn inference_failure_outputs_unannotated_frame() {
  let output = CollectOutput::default();
  let rendered = output.frames.clone();
  let model = CenterModel {
    fail_odd_calls: true,
    ..Default::default()
  };

  let report = PipelineTask::new(config(3))
    .unwrap()
    .run_task(frames(6), model, output)
    .unwrap();

  let rendered = rendered.lock().unwrap();
  let annotated: Vec<bool> = rendered.iter().map(|(_, r)| r.is_some()).collect();
  assert_eq!(annotated, vec![true, false, true, false, true, false]);
  assert_eq!(report.frames_processed, 6);
  assert_eq!(report.frames_failed, 3);
  assert_eq!(report.total_detections, 3);
}

#[test]
fn source_open_failure_stops_without_frames() {
  let output = CollectOutput::default();
  let rendered = output.frames.clone();
  let source = FlakySource {
    open_fails: true,
    failures_before_frames: 0,
    frames: 5,
    reads: 0,
    next_index: 0,
  };

  let report = PipelineTask::new(config(2))
    .unwrap()
    .run_task(source, CenterModel::default(), output)
    .unwrap();

  assert!(rendered.lock().unwrap().is_empty());
  assert!(!report.source_opened);
  assert_eq!(report.frames_processed, 0);
  assert_eq!(report.states, vec![PipelineState::Starting, PipelineState::Stopped]);
}

#[test]
fn transient_read_failures_are_skipped() {
  let output = CollectOutput::default();
  let rendered = output.frames.clone();
  let source = FlakySource {
    open_fails: false,
    failures_before_frames: 3,
    frames: 4,
    reads: 0,
    next_index: 0,
  };

  let report = PipelineTask::new(config(2))
    .unwrap()
    .run_task(source, CenterModel::default(), output)
    .unwrap();

  assert_eq!(rendered.lock().unwrap().len(), 4);
  assert_eq!(report.read_failures, 3);
  assert_eq!(report.frames_read, 4);
}

#[test]
fn persistent_read_failures_end_the_stream() {
  let output = CollectOutput::default();
  let source = FlakySource {
    open_fails: false,
    failures_before_frames: usize::MAX,
    frames: 4,
    reads: 0,
    next_index: 0,
  };
  let config = PipelineConfig {
    max_read_failures: 5,
    ..config(2)
  };

  let report = PipelineTask::new(config)
    .unwrap()
    .run_task(source, CenterModel::default(), output)
    .unwrap();

  assert_eq!(report.read_failures, 5);
  assert_eq!(report.frames_read, 0);
  assert_eq!(report.final_state(), PipelineState::Stopped);
}

#[test]
fn cancellation_stops_an_endless_source() {
  let cancel = CancellationToken::new();
  let output = CollectOutput {
    cancel_after: Some((5, cancel.clone())),
    ..Default::default()
  };
  let rendered = output.frames.clone();
  let endless = IterInput::new((0..).map(|i| Frame::filled(i, 64, 64, PixelFormat::Rgb, [0, 0, 0])));

  let report = PipelineTask::new(config(2))
    .unwrap()
    .with_cancellation(cancel.clone())
    .run_task(endless, CenterModel::default(), output)
    .unwrap();

  let rendered = rendered.lock().unwrap();
  assert!(cancel.is_cancelled());
  assert!(rendered.len() >= 5);
  // 取消之后最多还会处理队列中剩余的帧与正在写入的一帧
  assert!(rendered.len() <= 5 + 3);
  assert_eq!(report.frames_processed, report.frames_read - report.frames_dropped);
  assert_eq!(report.final_state(), PipelineState::Stopped);
}

#[test]
fn producer_panic_ends_the_run_with_an_error() {
  let output = CollectOutput::default();
  let rendered = output.frames.clone();
  let finished = output.finished.clone();
  let source = PanickingSource { panic_on: 3, reads: 0 };

  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    let result = PipelineTask::new(config(2))
      .unwrap()
      .run_task(source, CenterModel::default(), output);
    let _ = tx.send(result.is_err());
  });

  let failed = rx
    .recv_timeout(Duration::from_secs(10))
    .expect("pipeline did not return after the source panicked");
  assert!(failed);
  // 已入队的两帧仍被处理，输出也被正常关闭
  assert_eq!(rendered.lock().unwrap().len(), 2);
  assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn output_errors_do_not_stop_the_pipeline() {
  let report = PipelineTask::new(config(2))
    .unwrap()
    .run_task(frames(4), CenterModel::default(), FailingOutput)
    .unwrap();

  assert_eq!(report.frames_processed, 4);
  assert_eq!(report.output_failures, 4);
}

#[test]
fn zero_capacity_is_a_configuration_error() {
  assert!(PipelineTask::new(config(0)).is_err());
}
