// 该文件是 Shanan （山南西风） 项目的一部分。
// src/channel.rs - 有界帧队列
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

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::debug;

use crate::frame::Frame;

struct ChannelState<T> {
  queue: VecDeque<T>,
  closed: bool,
}

/// 采集线程与处理线程之间的有界阻塞队列
///
/// - 队列满且未关闭时 `push` 阻塞，形成背压；
/// - 队列空且未关闭时 `pop` 阻塞；
/// - `close` 唤醒所有等待者，之后 `push` 一律失败，`pop` 取完剩余元素后返回 `None`。
///
/// 所有失败都通过返回值表达，不会 panic。
pub struct BoundedFrameChannel<T = Frame> {
  state: Mutex<ChannelState<T>>,
  // 有空位可写
  not_full: Condvar,
  // 有元素可读
  not_empty: Condvar,
  capacity: usize,
}

impl<T> BoundedFrameChannel<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      state: Mutex::new(ChannelState {
        queue: VecDeque::with_capacity(capacity),
        closed: false,
      }),
      not_full: Condvar::new(),
      not_empty: Condvar::new(),
      capacity,
    }
  }

  // 队列状态在每条语句之间都保持一致，锁中毒时直接取回内部数据
  fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// 在队尾插入，成功返回 `true`
  ///
  /// 队列已关闭或容量为 0 时立即返回 `false`；
  /// 等待期间队列被关闭同样返回 `false`，元素被丢弃。
  pub fn push(&self, item: T) -> bool {
    let mut state = self.lock();
    if state.closed || self.capacity == 0 {
      return false;
    }

    while state.queue.len() >= self.capacity && !state.closed {
      state = self.not_full.wait(state).unwrap_or_else(|e| e.into_inner());
    }

    if state.closed {
      debug!("等待期间队列已关闭，丢弃当前元素");
      return false;
    }

    state.queue.push_back(item);
    drop(state);
    self.not_empty.notify_one();
    true
  }

  /// 取出队首元素；仅当队列既空又已关闭时返回 `None`
  pub fn pop(&self) -> Option<T> {
    let mut state = self.lock();
    while state.queue.is_empty() && !state.closed {
      state = self.not_empty.wait(state).unwrap_or_else(|e| e.into_inner());
    }

    let item = state.queue.pop_front()?;
    drop(state);
    self.not_full.notify_one();
    Some(item)
  }

  /// 关闭队列，可重复调用
  pub fn close(&self) {
    let mut state = self.lock();
    if !state.closed {
      debug!("关闭帧队列，剩余 {} 个元素", state.queue.len());
    }
    state.closed = true;
    drop(state);
    self.not_full.notify_all();
    self.not_empty.notify_all();
  }

  pub fn size(&self) -> usize {
    self.lock().queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().queue.is_empty()
  }

  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}
