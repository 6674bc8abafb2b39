//! Scripted 数据源
//!
//! 按预设脚本吐出记录，用于无外部依赖的测试。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{Clock, ContractError, RawRecord, RecordSource, ResumePoint, SourceTag};
use tracing::trace;

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// 立即产出一条记录
    Record(Bytes),
    /// 等待一段时间（遵循 tokio 时钟，可被 pause/advance 控制）
    Wait(Duration),
    /// 返回致命错误
    Fail(String),
}

/// Scripted 数据源
///
/// 脚本耗尽后：`finite` 为 true 则结束，否则永远挂起（模拟无新数据的直播流）。
pub struct ScriptedSource {
    name: String,
    tag: SourceTag,
    clock: Arc<dyn Clock>,
    steps: VecDeque<ScriptedStep>,
    finite: bool,
    opened_with: Option<ResumePoint>,
    closed: bool,
}

impl ScriptedSource {
    /// 创建新的 Scripted 数据源
    pub fn new(tag: SourceTag, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: format!("scripted:{tag}"),
            tag,
            clock,
            steps: VecDeque::new(),
            finite: true,
            opened_with: None,
            closed: false,
        }
    }

    /// 追加一条记录
    pub fn record(mut self, payload: impl Into<Bytes>) -> Self {
        self.steps.push_back(ScriptedStep::Record(payload.into()));
        self
    }

    /// 追加等待
    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push_back(ScriptedStep::Wait(duration));
        self
    }

    /// 追加致命错误
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(ScriptedStep::Fail(message.into()));
        self
    }

    /// 脚本耗尽后挂起而不是结束
    pub fn endless(mut self) -> Self {
        self.finite = false;
        self
    }

    /// `open` 收到的 resume point（未 open 时为 None）
    pub fn opened_with(&self) -> Option<&ResumePoint> {
        self.opened_with.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RecordSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> SourceTag {
        self.tag
    }

    async fn open(&mut self, resume: &ResumePoint) -> Result<(), ContractError> {
        self.opened_with = Some(resume.clone());
        Ok(())
    }

    async fn next_record(&mut self) -> Result<Option<RawRecord>, ContractError> {
        loop {
            match self.steps.pop_front() {
                Some(ScriptedStep::Record(payload)) => {
                    trace!(source = %self.name, "scripted record");
                    return Ok(Some(RawRecord::new(payload, self.clock.now_ms(), self.tag)));
                }
                Some(ScriptedStep::Wait(duration)) => tokio::time::sleep(duration).await,
                Some(ScriptedStep::Fail(message)) => {
                    return Err(ContractError::source_read(&self.name, message));
                }
                None if self.finite => return Ok(None),
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.closed = true;
        Ok(())
    }
}
