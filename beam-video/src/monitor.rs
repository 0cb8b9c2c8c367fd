//! Display size monitoring
//!
//! Subscribes to display-change events and invalidates the capture only when
//! the display size actually differs from the one used by the current encoder
//! session. Display managers fire change events for many reasons (brightness,
//! fold state, rotation), so spurious events must not restart the session.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use beam_common::Size;

use crate::capture::CaptureListener;
use crate::device::{DisplayListenerHandle, DisplayServices};

#[derive(Default)]
struct MonitorState {
    /// Size used by the current encoder session, `None` when unknown
    session_display_size: Mutex<Option<Size>>,
}

pub struct DisplaySizeMonitor {
    state: Arc<MonitorState>,
    services: Option<Arc<dyn DisplayServices>>,
    handle: Option<DisplayListenerHandle>,
}

impl DisplaySizeMonitor {
    pub fn new() -> Self {
        Self { state: Arc::new(MonitorState::default()), services: None, handle: None }
    }

    /// Start listening for changes of `display_id`, invalidating `listener`
    /// on an actual size change.
    pub fn start(
        &mut self,
        services: Arc<dyn DisplayServices>,
        display_id: u32,
        listener: Arc<dyn CaptureListener>,
    ) {
        let state = self.state.clone();
        let callback_services = services.clone();
        let handle = services.register_display_listener(
            display_id,
            Box::new(move || {
                on_display_changed(&state, callback_services.as_ref(), display_id, listener.as_ref());
            }),
        );
        self.services = Some(services);
        self.handle = Some(handle);
    }

    /// Record the display size the upcoming encoder session is based on.
    pub fn set_session_display_size(&self, size: Size) {
        *self.state.session_display_size.lock() = Some(size);
    }

    pub fn stop_and_release(&mut self) {
        if let (Some(services), Some(handle)) = (self.services.take(), self.handle.take()) {
            services.unregister_display_listener(handle);
        }
    }
}

impl Default for DisplaySizeMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn on_display_changed(
    state: &MonitorState,
    services: &dyn DisplayServices,
    display_id: u32,
    listener: &dyn CaptureListener,
) {
    match services.display_info(display_id) {
        None => {
            // Force a restart, the capture will fail and report the error
            warn!("Display {display_id} not found on change event");
            *state.session_display_size.lock() = None;
            listener.on_invalidated();
        }
        Some(info) => {
            let session_size = *state.session_display_size.lock();
            if session_size != Some(info.size) {
                debug!(
                    "Display size changed: {:?} -> {}, invalidating capture",
                    session_size, info.size
                );
                *state.session_display_size.lock() = None;
                listener.on_invalidated();
            } else {
                debug!("Display size not changed ({}), ignoring event", info.size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DisplayInfo, VirtualDisplayHandle};
    use crate::surface::Surface;
    use beam_common::BeamResult;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeDisplays {
        info: Mutex<Option<DisplayInfo>>,
        callback: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    }

    impl FakeDisplays {
        fn new(size: Size) -> Self {
            Self {
                info: Mutex::new(Some(DisplayInfo {
                    display_id: 0,
                    size,
                    rotation: 0,
                    dpi: 320,
                    layer_stack: 0,
                })),
                callback: Mutex::new(None),
            }
        }

        fn fire(&self) {
            if let Some(cb) = self.callback.lock().as_ref() {
                cb();
            }
        }

        fn set_size(&self, size: Size) {
            if let Some(info) = self.info.lock().as_mut() {
                info.size = size;
            }
        }
    }

    impl DisplayServices for FakeDisplays {
        fn display_info(&self, _display_id: u32) -> Option<DisplayInfo> {
            *self.info.lock()
        }

        fn create_virtual_display(
            &self,
            _name: &str,
            _size: Size,
            _mirrored_display_id: u32,
            _surface: Surface,
        ) -> BeamResult<Box<dyn VirtualDisplayHandle>> {
            unimplemented!()
        }

        fn create_new_display(
            &self,
            _name: &str,
            _size: Size,
            _dpi: u32,
            _surface: Surface,
        ) -> BeamResult<Box<dyn VirtualDisplayHandle>> {
            unimplemented!()
        }

        fn register_display_listener(
            &self,
            _display_id: u32,
            callback: Box<dyn Fn() + Send + Sync>,
        ) -> DisplayListenerHandle {
            *self.callback.lock() = Some(callback);
            DisplayListenerHandle(1)
        }

        fn unregister_display_listener(&self, _handle: DisplayListenerHandle) {
            *self.callback.lock() = None;
        }
    }

    struct CountingListener(AtomicU32);

    impl CaptureListener for CountingListener {
        fn on_invalidated(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_ignores_event_without_size_change() {
        let displays = Arc::new(FakeDisplays::new(Size::new(1920, 1080)));
        let listener = Arc::new(CountingListener(AtomicU32::new(0)));

        let mut monitor = DisplaySizeMonitor::new();
        monitor.start(displays.clone(), 0, listener.clone());
        monitor.set_session_display_size(Size::new(1920, 1080));

        displays.fire();
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);

        monitor.stop_and_release();
    }

    #[test]
    fn test_invalidates_on_size_change() {
        let displays = Arc::new(FakeDisplays::new(Size::new(1920, 1080)));
        let listener = Arc::new(CountingListener(AtomicU32::new(0)));

        let mut monitor = DisplaySizeMonitor::new();
        monitor.start(displays.clone(), 0, listener.clone());
        monitor.set_session_display_size(Size::new(1920, 1080));

        displays.set_size(Size::new(1080, 1920));
        displays.fire();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        monitor.stop_and_release();
    }

    #[test]
    fn test_invalidates_when_display_disappears() {
        let displays = Arc::new(FakeDisplays::new(Size::new(1920, 1080)));
        let listener = Arc::new(CountingListener(AtomicU32::new(0)));

        let mut monitor = DisplaySizeMonitor::new();
        monitor.start(displays.clone(), 0, listener.clone());
        monitor.set_session_display_size(Size::new(1920, 1080));

        *displays.info.lock() = None;
        displays.fire();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        monitor.stop_and_release();
    }

    #[test]
    fn test_stop_unregisters() {
        let displays = Arc::new(FakeDisplays::new(Size::new(1920, 1080)));
        let listener = Arc::new(CountingListener(AtomicU32::new(0)));

        let mut monitor = DisplaySizeMonitor::new();
        monitor.start(displays.clone(), 0, listener.clone());
        monitor.stop_and_release();

        assert!(displays.callback.lock().is_none());
    }
}
