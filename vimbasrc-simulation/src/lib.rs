//! 可脚本化的进程内 [`CameraSdk`] 实现。
//!
//! 只有测试 (或示例) 调用 [`SimulatedSdk::emit_frame`] 时才会产生帧，
//! 并在调用线程上触发已注册的回调。每次 SDK 调用都会被记录，
//! 以便精确断言拆除顺序。

mod camera;

pub use camera::{FeatureValue, SimulatedCamera};

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vimbasrc_core::buffer::FrameBuffer;
use vimbasrc_core::frame::FrameStatus;
use vimbasrc_core::sdk::{AccessMode, CameraSdk, DeviceHandle, FrameDelegate, SdkError, SdkResult};
use vimbasrc_core::traits::DeviceInfo;

/// 模拟 30 fps 下每帧的设备 tick 数
const TICKS_PER_FRAME: u64 = 33_333_333;

/// 一次被记录的 SDK 调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkCall {
    ListCameras,
    Open(String),
    Close,
    Announce(usize),
    Revoke(usize),
    CaptureStart,
    CaptureEnd,
    Flush,
    QueueFrame(usize),
    Command(String),
    FeatureGet(String),
    FeatureSet(String),
    EnumRange(String),
}

/// 注入到后续匹配调用中的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 注入后第 n 次 announce (从 0 计) 失败
    AnnounceAt(usize, SdkError),
    CaptureStart(SdkError),
    AcquisitionStart(SdkError),
    AcquisitionStop(SdkError),
    CaptureEnd(SdkError),
    /// 撤销该槽位的缓冲区失败，缓冲区仍留在驱动中。
    Revoke(usize, SdkError),
    /// 注入期间所有 `queue_frame` 都失败
    QueueFrame(SdkError),
    PayloadSize(SdkError),
    Close(SdkError),
}

struct Session {
    camera: usize,
    announced: Vec<Arc<FrameBuffer>>,
    queued: VecDeque<(Arc<FrameBuffer>, Arc<dyn FrameDelegate>)>,
    capture_running: bool,
    acquiring: bool,
}

impl Session {
    fn new(camera: usize) -> Self {
        Self {
            camera,
            announced: Vec::new(),
            queued: VecDeque::new(),
            capture_running: false,
            acquiring: false,
        }
    }
}

#[derive(Default)]
struct SimState {
    cameras: Vec<SimulatedCamera>,
    sessions: HashMap<DeviceHandle, Session>,
    faults: Vec<Fault>,
    announces_since_fault: usize,
    next_frame_id: u64,
}

#[derive(Default)]
pub struct SimulatedSdk {
    state: Mutex<SimState>,
    calls: Mutex<Vec<SdkCall>>,
    next_handle: AtomicU64,
}

impl fmt::Debug for SimulatedSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("SimulatedSdk")
            .field("cameras", &state.cameras.len())
            .field("sessions", &state.sessions.len())
            .finish()
    }
}

impl SimulatedSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(self, camera: SimulatedCamera) -> Self {
        self.state().cameras.push(camera);
        self
    }

    pub fn inject(&self, fault: Fault) {
        let mut state = self.state();
        if matches!(fault, Fault::AnnounceAt(..)) {
            state.announces_since_fault = 0;
        }
        state.faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    pub fn calls(&self) -> Vec<SdkCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self, pred: impl Fn(&SdkCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// 相机 `id` 当前已注册的缓冲区
    pub fn announced(&self, id: &str) -> Vec<Arc<FrameBuffer>> {
        let state = self.state();
        state
            .sessions
            .values()
            .find(|s| state.cameras[s.camera].info.id == id)
            .map(|s| s.announced.clone())
            .unwrap_or_default()
    }

    /// 所有会话中位于驱动采集队列的缓冲区数
    pub fn pending_buffers(&self) -> usize {
        self.state().sessions.values().map(|s| s.queued.len()).sum()
    }

    pub fn open_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    pub fn is_acquiring(&self) -> bool {
        self.state().sessions.values().any(|s| s.acquiring)
    }

    /// 用生成的 payload 完成正在采集的相机最早入队的缓冲区。
    /// 返回帧 id；驱动队列为空时返回 `None`。
    pub fn emit_frame(&self, status: FrameStatus) -> Option<u64> {
        self.emit(None, status, None)
    }

    /// 同 [`emit_frame`](Self::emit_frame)，但显式指定 id 与 payload
    pub fn emit_frame_as(&self, frame_id: u64, status: FrameStatus, payload: &[u8]) -> Option<u64> {
        self.emit(Some(frame_id), status, Some(payload))
    }

    fn emit(&self, frame_id: Option<u64>, status: FrameStatus, payload: Option<&[u8]>) -> Option<u64> {
        let (handle, buffer, delegate, frame_id, size) = {
            let mut state = self.state();
            let SimState {
                cameras,
                sessions,
                next_frame_id,
                ..
            } = &mut *state;
            let (handle, session) = sessions.iter_mut().find(|(_, s)| s.acquiring)?;
            let (buffer, delegate) = session.queued.pop_front()?;
            let id = frame_id.unwrap_or_else(|| {
                *next_frame_id += 1;
                *next_frame_id
            });
            let size = match cameras[session.camera].get("PayloadSize") {
                Ok(FeatureValue::Int(v)) => usize::try_from(*v).unwrap_or(0),
                _ => buffer.capacity(),
            };
            (*handle, buffer, delegate, id, size)
        };

        // 在状态锁之外填充并回调：回调内部会重新入队
        let generated;
        let payload = match payload {
            Some(p) => p,
            None => {
                generated = vec![(frame_id % 251) as u8; size];
                &generated
            }
        };
        buffer.fill(payload, frame_id, frame_id * TICKS_PER_FRAME, status);
        tracing::trace!(target: "vimbasrc::simulation", frame_id, ?status, "emit");
        delegate.frame_done(handle, buffer);
        Some(frame_id)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: SdkCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn camera_mut<'a>(state: &'a mut SimState, handle: DeviceHandle) -> SdkResult<&'a mut SimulatedCamera> {
        let index = state.sessions.get(&handle).ok_or(SdkError::BadHandle)?.camera;
        Ok(&mut state.cameras[index])
    }

    fn fault_for(state: &SimState, pick: impl Fn(&Fault) -> Option<SdkError>) -> Option<SdkError> {
        state.faults.iter().find_map(pick)
    }
}

impl CameraSdk for SimulatedSdk {
    fn list_cameras(&self) -> SdkResult<Vec<DeviceInfo>> {
        self.record(SdkCall::ListCameras);
        Ok(self.state().cameras.iter().map(|c| c.info.clone()).collect())
    }

    fn open_camera(&self, id: &str, _mode: AccessMode) -> SdkResult<DeviceHandle> {
        self.record(SdkCall::Open(id.to_owned()));
        let mut state = self.state();
        let index = state
            .cameras
            .iter()
            .position(|c| c.info.id == id)
            .ok_or(SdkError::NotFound)?;
        let already_open = state.sessions.values().any(|s| s.camera == index);
        if state.cameras[index].locked || already_open {
            return Err(SdkError::InvalidAccess);
        }

        let handle = DeviceHandle::from_raw(0x1000 + self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.sessions.insert(handle, Session::new(index));
        Ok(handle)
    }

    fn close_camera(&self, handle: DeviceHandle) -> SdkResult<()> {
        self.record(SdkCall::Close);
        let mut state = self.state();
        if let Some(err) = Self::fault_for(&state, |f| match f {
            Fault::Close(e) => Some(*e),
            _ => None,
        }) {
            // 与真实传输层一致，无论成败句柄都已失效
            state.sessions.remove(&handle);
            return Err(err);
        }
        state
            .sessions
            .remove(&handle)
            .map(|_| ())
            .ok_or(SdkError::BadHandle)
    }

    fn announce_frame(&self, handle: DeviceHandle, buffer: &Arc<FrameBuffer>) -> SdkResult<()> {
        self.record(SdkCall::Announce(buffer.slot()));
        let mut state = self.state();
        let nth = state.announces_since_fault;
        state.announces_since_fault += 1;
        if let Some(err) = Self::fault_for(&state, |f| match f {
            Fault::AnnounceAt(at, e) if *at == nth => Some(*e),
            _ => None,
        }) {
            return Err(err);
        }

        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        if session.announced.iter().any(|b| Arc::ptr_eq(b, buffer)) {
            return Err(SdkError::InternalFault);
        }
        session.announced.push(Arc::clone(buffer));
        Ok(())
    }

    fn revoke_frame(&self, handle: DeviceHandle, buffer: &Arc<FrameBuffer>) -> SdkResult<()> {
        self.record(SdkCall::Revoke(buffer.slot()));
        let mut state = self.state();
        if let Some(err) = Self::fault_for(&state, |f| match f {
            Fault::Revoke(slot, e) if *slot == buffer.slot() => Some(*e),
            _ => None,
        }) {
            return Err(err);
        }
        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        let pos = session
            .announced
            .iter()
            .position(|b| Arc::ptr_eq(b, buffer))
            .ok_or(SdkError::NotFound)?;
        session.announced.remove(pos);
        session.queued.retain(|(b, _)| !Arc::ptr_eq(b, buffer));
        Ok(())
    }

    fn capture_start(&self, handle: DeviceHandle) -> SdkResult<()> {
        self.record(SdkCall::CaptureStart);
        let mut state = self.state();
        if let Some(err) = Self::fault_for(&state, |f| match f {
            Fault::CaptureStart(e) => Some(*e),
            _ => None,
        }) {
            return Err(err);
        }
        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        session.capture_running = true;
        Ok(())
    }

    fn capture_end(&self, handle: DeviceHandle) -> SdkResult<()> {
        self.record(SdkCall::CaptureEnd);
        let mut state = self.state();
        if let Some(err) = Self::fault_for(&state, |f| match f {
            Fault::CaptureEnd(e) => Some(*e),
            _ => None,
        }) {
            return Err(err);
        }
        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        if !session.capture_running {
            return Err(SdkError::ApiNotStarted);
        }
        session.capture_running = false;
        session.queued.clear();
        Ok(())
    }

    fn capture_queue_flush(&self, handle: DeviceHandle) -> SdkResult<()> {
        self.record(SdkCall::Flush);
        let mut state = self.state();
        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        session.queued.clear();
        Ok(())
    }

    fn queue_frame(
        &self,
        handle: DeviceHandle,
        buffer: Arc<FrameBuffer>,
        delegate: Arc<dyn FrameDelegate>,
    ) -> SdkResult<()> {
        self.record(SdkCall::QueueFrame(buffer.slot()));
        let mut state = self.state();
        if let Some(err) = Self::fault_for(&state, |f| match f {
            Fault::QueueFrame(e) => Some(*e),
            _ => None,
        }) {
            return Err(err);
        }
        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        if !session.capture_running {
            return Err(SdkError::ApiNotStarted);
        }
        if !session.announced.iter().any(|b| Arc::ptr_eq(b, &buffer)) {
            return Err(SdkError::NotFound);
        }
        session.queued.push_back((buffer, delegate));
        Ok(())
    }

    fn run_command(&self, handle: DeviceHandle, name: &str) -> SdkResult<()> {
        self.record(SdkCall::Command(name.to_owned()));
        let mut state = self.state();
        let fault = Self::fault_for(&state, |f| match (f, name) {
            (Fault::AcquisitionStart(e), "AcquisitionStart") => Some(*e),
            (Fault::AcquisitionStop(e), "AcquisitionStop") => Some(*e),
            _ => None,
        });
        let session = state.sessions.get_mut(&handle).ok_or(SdkError::BadHandle)?;
        if let Some(err) = fault {
            return Err(err);
        }
        match name {
            "AcquisitionStart" => session.acquiring = true,
            "AcquisitionStop" => session.acquiring = false,
            _ => return Err(SdkError::NotFound),
        }
        Ok(())
    }

    fn feature_int_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<i64> {
        self.record(SdkCall::FeatureGet(name.to_owned()));
        let mut state = self.state();
        if name == "PayloadSize" {
            if let Some(err) = Self::fault_for(&state, |f| match f {
                Fault::PayloadSize(e) => Some(*e),
                _ => None,
            }) {
                return Err(err);
            }
        }
        match Self::camera_mut(&mut state, handle)?.get(name)? {
            FeatureValue::Int(v) => Ok(*v),
            _ => Err(SdkError::WrongType),
        }
    }

    fn feature_int_set(&self, handle: DeviceHandle, name: &str, value: i64) -> SdkResult<()> {
        self.record(SdkCall::FeatureSet(name.to_owned()));
        let mut state = self.state();
        Self::camera_mut(&mut state, handle)?.set(name, FeatureValue::Int(value))
    }

    fn feature_float_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<f64> {
        self.record(SdkCall::FeatureGet(name.to_owned()));
        let mut state = self.state();
        match Self::camera_mut(&mut state, handle)?.get(name)? {
            FeatureValue::Float(v) => Ok(*v),
            _ => Err(SdkError::WrongType),
        }
    }

    fn feature_float_set(&self, handle: DeviceHandle, name: &str, value: f64) -> SdkResult<()> {
        self.record(SdkCall::FeatureSet(name.to_owned()));
        let mut state = self.state();
        Self::camera_mut(&mut state, handle)?.set(name, FeatureValue::Float(value))
    }

    fn feature_enum_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<String> {
        self.record(SdkCall::FeatureGet(name.to_owned()));
        let mut state = self.state();
        match Self::camera_mut(&mut state, handle)?.get(name)? {
            FeatureValue::Enum(v) => Ok(v.clone()),
            _ => Err(SdkError::WrongType),
        }
    }

    fn feature_enum_set(&self, handle: DeviceHandle, name: &str, value: &str) -> SdkResult<()> {
        self.record(SdkCall::FeatureSet(name.to_owned()));
        let mut state = self.state();
        Self::camera_mut(&mut state, handle)?.set(name, FeatureValue::Enum(value.to_owned()))
    }

    fn feature_string_get(&self, handle: DeviceHandle, name: &str) -> SdkResult<String> {
        self.record(SdkCall::FeatureGet(name.to_owned()));
        let mut state = self.state();
        match Self::camera_mut(&mut state, handle)?.get(name)? {
            FeatureValue::Str(v) => Ok(v.clone()),
            _ => Err(SdkError::WrongType),
        }
    }

    fn feature_string_set(&self, handle: DeviceHandle, name: &str, value: &str) -> SdkResult<()> {
        self.record(SdkCall::FeatureSet(name.to_owned()));
        let mut state = self.state();
        Self::camera_mut(&mut state, handle)?.set(name, FeatureValue::Str(value.to_owned()))
    }

    fn feature_enum_range(&self, handle: DeviceHandle, name: &str) -> SdkResult<Vec<String>> {
        self.record(SdkCall::EnumRange(name.to_owned()));
        let mut state = self.state();
        Self::camera_mut(&mut state, handle)?
            .enum_ranges
            .get(name)
            .cloned()
            .ok_or(SdkError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<u64>>);

    impl FrameDelegate for Recorder {
        fn frame_done(self: Arc<Self>, _handle: DeviceHandle, buffer: Arc<FrameBuffer>) {
            self.0.lock().unwrap().push(buffer.info().frame_id);
        }
    }

    #[test]
    fn unknown_camera_is_not_found() {
        let sdk = SimulatedSdk::new().with_camera(SimulatedCamera::new("DEV_1"));
        assert_eq!(
            sdk.open_camera("DEV_2", AccessMode::Full),
            Err(SdkError::NotFound)
        );
    }

    #[test]
    fn locked_camera_denies_access() {
        let sdk = SimulatedSdk::new().with_camera(SimulatedCamera::new("DEV_1").locked());
        assert_eq!(
            sdk.open_camera("DEV_1", AccessMode::Full),
            Err(SdkError::InvalidAccess)
        );
    }

    #[test]
    fn frames_only_flow_while_acquiring() {
        let sdk = SimulatedSdk::new().with_camera(SimulatedCamera::new("DEV_1").payload_size(8));
        let handle = sdk.open_camera("DEV_1", AccessMode::Full).unwrap();
        let buffer = Arc::new(FrameBuffer::new(0, 8).unwrap());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));

        sdk.announce_frame(handle, &buffer).unwrap();
        assert_eq!(
            sdk.queue_frame(handle, Arc::clone(&buffer), recorder.clone()),
            Err(SdkError::ApiNotStarted)
        );

        sdk.capture_start(handle).unwrap();
        sdk.queue_frame(handle, Arc::clone(&buffer), recorder.clone()).unwrap();
        assert_eq!(sdk.emit_frame(FrameStatus::Complete), None);

        sdk.run_command(handle, "AcquisitionStart").unwrap();
        assert_eq!(sdk.emit_frame_as(7, FrameStatus::Complete, &[1, 2]), Some(7));
        assert_eq!(*recorder.0.lock().unwrap(), vec![7]);
        assert_eq!(buffer.info().image_size, 2);

        // 回调没有重新入队，驱动队列为空
        assert_eq!(sdk.emit_frame(FrameStatus::Complete), None);
    }

    #[test]
    fn announce_fault_hits_requested_index() {
        let sdk = SimulatedSdk::new().with_camera(SimulatedCamera::new("DEV_1"));
        let handle = sdk.open_camera("DEV_1", AccessMode::Full).unwrap();
        sdk.inject(Fault::AnnounceAt(1, SdkError::InternalFault));

        let a = Arc::new(FrameBuffer::new(0, 4).unwrap());
        let b = Arc::new(FrameBuffer::new(1, 4).unwrap());
        assert!(sdk.announce_frame(handle, &a).is_ok());
        assert_eq!(sdk.announce_frame(handle, &b), Err(SdkError::InternalFault));
        assert_eq!(sdk.announced("DEV_1").len(), 1);
    }
}
