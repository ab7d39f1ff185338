//! WebXR adapter
//!
//! Implements the controller's device port on top of `navigator.xr`. The XR
//! types are reached through `js_sys::Reflect` so no unstable web-sys
//! bindings are needed.
//!
//! JS callbacks (promises, select events, session end) never touch the
//! controller directly: they queue an [`XrEvent`] and [`XrBridge::pump`]
//! applies the queue in arrival order. Events queued while a pump is running
//! are picked up by that pump before it returns.

use bevy::prelude::*;
use fauna_core::config::SessionConfig;
use fauna_core::{
    AnchorId, ArController, FrameLoop, FrameOutcome, FrameSample, HitSample, InputChannel, PlacementTicket,
    SessionToken, XrDevice, XrError,
};
use fauna_scene::{RenderCamera, SharedController};
use js_sys::{Array, Float32Array, Function, Object, Promise, Reflect};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};

/// Canvas Bevy renders into; DOM select events are taken from it
pub const CANVAS_SELECTOR: &str = "#fauna-canvas";

/// DOM events whose target sits inside this class never place anything
const IGNORED_BUTTON_SELECTOR: &str = ".xr-btn";

/// Input and async completions waiting to be applied
enum XrEvent {
    SessionStarted(JsValue),
    SessionEnded,
    ReferenceSpace {
        token: SessionToken,
        result: Result<JsValue, XrError>,
    },
    HitTestSource {
        token: SessionToken,
        result: Result<JsValue, XrError>,
    },
    Anchor {
        ticket: PlacementTicket,
        result: Result<JsValue, XrError>,
    },
    BaseLayer {
        token: SessionToken,
        result: Result<JsValue, XrError>,
    },
    Select {
        channel: InputChannel,
        at: Duration,
    },
}

type EventQueue = Rc<RefCell<Vec<XrEvent>>>;
type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64, JsValue)>>>>;

/// A registered JS event listener, removed on drop of the session
struct Listener {
    target: web_sys::EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

impl Listener {
    fn remove(self) {
        if let Err(e) = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref())
        {
            tracing::debug!("Failed to remove {} listener: {}", self.event, js_message(&e));
        }
    }
}

/// The XR frame loop runs once the controller asks for it and the session
/// has a base layer. The browser delivers no XR frames without one, and the
/// two arrive in either order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct XrLoopGate {
    requested: bool,
    layer_bound: bool,
}

impl XrLoopGate {
    fn is_open(&self) -> bool {
        self.requested && self.layer_bound
    }

    /// Controller started the XR loop. True if frames should be scheduled now.
    fn request(&mut self) -> bool {
        let was_open = self.is_open();
        self.requested = true;
        !was_open && self.is_open()
    }

    /// Base layer bound. True if frames should be scheduled now.
    fn bind_layer(&mut self) -> bool {
        let was_open = self.is_open();
        self.layer_bound = true;
        !was_open && self.is_open()
    }

    /// Controller stopped the XR loop. True if a scheduled frame must be cancelled.
    fn stop(&mut self) -> bool {
        let was_open = self.is_open();
        self.requested = false;
        was_open
    }
}

/// JS-side objects of the current session
#[derive(Default)]
struct XrInner {
    session: Option<JsValue>,
    token: Option<SessionToken>,
    reference_space: Option<JsValue>,
    hit_test_sources: HashMap<SessionToken, JsValue>,
    /// Most recent hit-test result, used to create anchors
    last_hit: Option<JsValue>,
    anchors: HashMap<AnchorId, JsValue>,
    next_anchor: u64,
    listeners: HashMap<InputChannel, Vec<Listener>>,
    end_listener: Option<Listener>,
    /// Keeps the session's WebGL layer alive
    base_layer: Option<JsValue>,
    gate: XrLoopGate,
    frame_handle: Option<f64>,
}

/// Browser side of the AR session. Lives as a non-send resource because it
/// holds JS handles.
#[derive(Clone)]
pub struct XrBridge {
    inner: Rc<RefCell<XrInner>>,
    events: EventQueue,
    frame_callback: FrameCallback,
    presenting: Rc<Cell<bool>>,
    /// Pointer is over an egui panel drawn on the canvas
    pointer_over_ui: Rc<Cell<bool>>,
    supported: Rc<Cell<Option<bool>>>,
    controller: SharedController,
    camera: RenderCamera,
}

impl XrBridge {
    pub fn new(controller: SharedController, camera: RenderCamera) -> Self {
        let bridge = Self {
            inner: Rc::new(RefCell::new(XrInner::default())),
            events: Rc::new(RefCell::new(Vec::new())),
            frame_callback: Rc::new(RefCell::new(None)),
            presenting: Rc::new(Cell::new(false)),
            pointer_over_ui: Rc::new(Cell::new(false)),
            supported: Rc::new(Cell::new(None)),
            controller,
            camera,
        };

        let handle = bridge.clone();
        let callback = Closure::wrap(Box::new(move |_time: f64, frame: JsValue| {
            handle.on_xr_frame(frame);
        }) as Box<dyn FnMut(f64, JsValue)>);
        *bridge.frame_callback.borrow_mut() = Some(callback);

        bridge
    }

    /// Whether `immersive-ar` is available. `None` until the probe finishes.
    pub fn supported(&self) -> Option<bool> {
        self.supported.get()
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting.get()
    }

    /// Canvas taps on the control panel are not placement requests
    pub fn set_pointer_over_ui(&self, over: bool) {
        self.pointer_over_ui.set(over);
    }

    /// Ask the browser whether AR sessions are supported
    pub fn probe_support(&self) {
        let supported = self.supported.clone();
        spawn_local(async move {
            let result = async {
                let xr = navigator_xr()?;
                await_promise(call1(&xr, "isSessionSupported", &JsValue::from_str("immersive-ar"))?).await
            }
            .await;
            match result {
                Ok(value) => {
                    let available = value.as_bool().unwrap_or(false);
                    tracing::info!("immersive-ar supported: {}", available);
                    supported.set(Some(available));
                }
                Err(e) => {
                    tracing::warn!("WebXR unavailable: {}", e);
                    supported.set(Some(false));
                }
            }
        });
    }

    /// Register the preview loop with the controller
    pub fn start_preview(&self) {
        let mut inner = self.inner.borrow_mut();
        let mut controller = self.controller.lock();
        let mut device = self.device(&mut inner);
        controller.start_preview(&mut device);
    }

    /// Enter AR. The session object arrives through the event queue.
    pub fn request_session(&self) {
        if self.presenting.get() {
            return;
        }
        let config = self.controller.lock().config().session.clone();
        let bridge = self.clone();
        spawn_local(async move {
            match start_session(&config).await {
                Ok(session) => bridge.queue(XrEvent::SessionStarted(session)),
                Err(e) => tracing::warn!("Could not start AR session: {}", e),
            }
        });
    }

    /// Exit AR. Teardown runs when the session's `end` event arrives.
    pub fn end_session(&self) {
        let session = self.inner.borrow().session.clone();
        if let Some(session) = session {
            if let Err(e) = call0(&session, "end") {
                tracing::warn!("Failed to end AR session: {}", e);
            }
        }
    }

    /// Queue an event and apply it right away unless a pump is running
    fn queue(&self, event: XrEvent) {
        self.events.borrow_mut().push(event);
        self.pump();
    }

    /// Apply every queued event to the controller
    pub fn pump(&self) {
        // Already pumping further up the stack; that pump drains the queue
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };

        loop {
            let events = std::mem::take(&mut *self.events.borrow_mut());
            if events.is_empty() {
                return;
            }
            let mut controller = self.controller.lock();
            let mut device = self.device(&mut inner);
            for event in events {
                device.apply(event, &mut controller);
            }
        }
    }

    fn device<'a>(&'a self, inner: &'a mut XrInner) -> WebXrDevice<'a> {
        WebXrDevice { inner, bridge: self }
    }

    fn on_xr_frame(&self, frame: JsValue) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.gate.is_open() {
                return;
            }
            inner.frame_handle = None;
        }

        self.pump();

        let sample = {
            let mut inner = self.inner.borrow_mut();
            // The pump may have ended the session
            if !inner.gate.is_open() {
                return;
            }
            sample_frame(&mut inner, &frame)
        };

        let outcome = self.controller.lock().xr_tick(sample.as_ref());
        if let FrameOutcome::Render(source) = outcome {
            self.camera.set(source);
        }

        let mut inner = self.inner.borrow_mut();
        if inner.gate.is_open() {
            request_frame(&mut inner, &self.frame_callback);
        }
    }
}

/// Device port view over the bridge state, valid for one pump
struct WebXrDevice<'a> {
    inner: &'a mut XrInner,
    bridge: &'a XrBridge,
}

impl WebXrDevice<'_> {
    /// Completion known synchronously; applied later in the same pump
    fn push(&self, event: XrEvent) {
        self.bridge.events.borrow_mut().push(event);
    }

    fn apply(&mut self, event: XrEvent, controller: &mut ArController) {
        match event {
            XrEvent::SessionStarted(session) => {
                let bridge = self.bridge.clone();
                match add_listener(&session, "end", None, move |_| bridge.queue(XrEvent::SessionEnded)) {
                    Ok(listener) => self.inner.end_listener = Some(listener),
                    Err(e) => tracing::warn!("No end listener on AR session: {}", js_message(&e)),
                }
                let layer_session = session.clone();
                self.inner.session = Some(session);
                self.bridge.presenting.set(true);
                let token = controller.on_session_start(self);
                self.inner.token = Some(token);

                let bridge = self.bridge.clone();
                spawn_local(async move {
                    let result = bind_base_layer(&layer_session).await;
                    bridge.queue(XrEvent::BaseLayer { token, result });
                });
            }
            XrEvent::BaseLayer { token, result } => {
                if self.inner.token != Some(token) {
                    return;
                }
                match result {
                    Ok(layer) => {
                        self.inner.base_layer = Some(layer);
                        if self.inner.gate.bind_layer() {
                            request_frame(&mut *self.inner, &self.bridge.frame_callback);
                        }
                    }
                    Err(e) => {
                        // No frames would ever arrive; leave AR and let the end event tear down
                        tracing::warn!("No XR base layer, ending AR session: {}", e);
                        if let Some(session) = self.inner.session.as_ref() {
                            if let Err(e) = call0(session, "end") {
                                tracing::warn!("Failed to end AR session: {}", e);
                            }
                        }
                    }
                }
            }
            XrEvent::SessionEnded => {
                controller.on_session_end(self);
                if let Some(listener) = self.inner.end_listener.take() {
                    listener.remove();
                }
                for (id, anchor) in self.inner.anchors.drain() {
                    if let Err(e) = call0(&anchor, "delete") {
                        tracing::debug!(anchor = id.0, "Anchor delete failed: {}", e);
                    }
                }
                self.inner.session = None;
                self.inner.base_layer = None;
                self.inner.gate = XrLoopGate::default();
                self.inner.token = None;
                self.inner.reference_space = None;
                self.inner.last_hit = None;
                self.bridge.presenting.set(false);
            }
            XrEvent::ReferenceSpace { token, result } => {
                let result = match result {
                    Ok(space) => {
                        if self.inner.token == Some(token) {
                            self.inner.reference_space = Some(space);
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                controller.on_reference_space(token, result, self);
            }
            XrEvent::HitTestSource { token, result } => {
                let result = match result {
                    Ok(source) => {
                        // Kept even when stale so the controller can cancel it
                        self.inner.hit_test_sources.insert(token, source);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                controller.on_hit_test_source(token, result, self);
            }
            XrEvent::Anchor { ticket, result } => {
                let result = result.map(|anchor| {
                    let id = AnchorId(self.inner.next_anchor);
                    self.inner.next_anchor += 1;
                    self.inner.anchors.insert(id, anchor);
                    id
                });
                controller.on_anchor_created(ticket, result, self);
            }
            XrEvent::Select { channel, at } => {
                controller.on_select(channel, at, self);
            }
        }
    }

    fn session(&self) -> Option<&JsValue> {
        self.inner.session.as_ref()
    }

    fn select_listeners(&self, channel: InputChannel) -> Result<Vec<Listener>, JsValue> {
        let session = self.session().cloned().ok_or_else(|| JsValue::from_str("no session"))?;
        let mut listeners = Vec::new();

        let result = (|| -> Result<(), JsValue> {
            match channel {
                InputChannel::Session => {
                    for event in ["selectstart", "select"] {
                        let bridge = self.bridge.clone();
                        listeners.push(add_listener(&session, event, None, move |_| {
                            bridge.queue(select(InputChannel::Session));
                        })?);
                    }
                }
                InputChannel::Controller => {
                    for event in ["selectstart", "select"] {
                        let bridge = self.bridge.clone();
                        let owner = session.clone();
                        listeners.push(add_listener(&session, event, None, move |e| {
                            if from_first_input_source(&owner, &e) {
                                bridge.queue(select(InputChannel::Controller));
                            }
                        })?);
                    }
                }
                InputChannel::Dom => {
                    let canvas = web_sys::window()
                        .and_then(|w| w.document())
                        .and_then(|d| d.query_selector(CANVAS_SELECTOR).ok().flatten())
                        .ok_or_else(|| JsValue::from_str("canvas not found"))?;
                    let options = web_sys::AddEventListenerOptions::new();
                    options.set_passive(true);
                    for event in ["pointerup", "click", "touchend"] {
                        let bridge = self.bridge.clone();
                        listeners.push(add_listener(&canvas, event, Some(&options), move |e| {
                            let counts = bridge.presenting.get() && !bridge.pointer_over_ui.get();
                            if counts && !on_ignored_button(&e) {
                                bridge.queue(select(InputChannel::Dom));
                            }
                        })?);
                    }
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(listeners),
            Err(e) => {
                for listener in listeners {
                    listener.remove();
                }
                Err(e)
            }
        }
    }
}

impl XrDevice for WebXrDevice<'_> {
    fn request_reference_space(&mut self, kind: &str, token: SessionToken) {
        let Some(session) = self.session().cloned() else {
            self.push(XrEvent::ReferenceSpace {
                token,
                result: Err(XrError::ReferenceSpaceUnavailable("no session".to_string())),
            });
            return;
        };
        let kind = kind.to_string();
        let bridge = self.bridge.clone();
        spawn_local(async move {
            let result = async { await_promise(call1(&session, "requestReferenceSpace", &JsValue::from_str(&kind))?).await }
                .await
                .map_err(|e| XrError::ReferenceSpaceUnavailable(format!("{}: {}", kind, e)));
            bridge.queue(XrEvent::ReferenceSpace { token, result });
        });
    }

    fn add_select_listener(&mut self, channel: InputChannel) -> Result<(), XrError> {
        let listeners = self.select_listeners(channel).map_err(|e| XrError::ListenerFailed {
            channel: channel.to_string(),
            reason: js_message(&e),
        })?;
        self.inner.listeners.insert(channel, listeners);
        Ok(())
    }

    fn remove_select_listener(&mut self, channel: InputChannel) {
        for listener in self.inner.listeners.remove(&channel).unwrap_or_default() {
            listener.remove();
        }
    }

    fn request_hit_test_source(&mut self, token: SessionToken) {
        let Some(session) = self.session().cloned() else {
            self.push(XrEvent::HitTestSource {
                token,
                result: Err(XrError::HitTestUnavailable("no session".to_string())),
            });
            return;
        };
        let bridge = self.bridge.clone();
        spawn_local(async move {
            let result = create_hit_test_source(&session)
                .await
                .map_err(|e| XrError::HitTestUnavailable(e.to_string()));
            bridge.queue(XrEvent::HitTestSource { token, result });
        });
    }

    fn cancel_hit_test_source(&mut self, token: SessionToken) {
        if let Some(source) = self.inner.hit_test_sources.remove(&token) {
            if let Err(e) = call0(&source, "cancel") {
                tracing::debug!("Hit-test source cancel failed: {}", e);
            }
        }
    }

    fn request_anchor(&mut self, ticket: PlacementTicket) {
        let Some(hit) = self.inner.last_hit.clone() else {
            self.push(XrEvent::Anchor {
                ticket,
                result: Err(XrError::AnchorUnsupported),
            });
            return;
        };
        let bridge = self.bridge.clone();
        spawn_local(async move {
            let result = async { await_promise(call0(&hit, "createAnchor")?).await }
                .await
                .map_err(|e| XrError::AnchorFailed(e.to_string()));
            bridge.queue(XrEvent::Anchor { ticket, result });
        });
    }

    fn delete_anchor(&mut self, anchor: AnchorId) {
        if let Some(handle) = self.inner.anchors.remove(&anchor) {
            if let Err(e) = call0(&handle, "delete") {
                tracing::debug!("Anchor delete failed: {}", e);
            }
        }
    }

    fn start_frame_loop(&mut self, mode: FrameLoop) {
        match mode {
            FrameLoop::Xr => {
                if self.inner.gate.request() {
                    request_frame(&mut *self.inner, &self.bridge.frame_callback);
                } else {
                    tracing::debug!("XR loop waiting for the base layer");
                }
            }
            // Bevy's window loop drives the preview
            FrameLoop::Fallback | FrameLoop::Stopped => {}
        }
    }

    fn stop_frame_loop(&mut self) {
        if !self.inner.gate.stop() {
            return;
        }
        if let (Some(session), Some(handle)) = (self.inner.session.as_ref(), self.inner.frame_handle.take()) {
            if let Err(e) = call1(session, "cancelAnimationFrame", &JsValue::from_f64(handle)) {
                tracing::debug!("cancelAnimationFrame failed: {}", e);
            }
        }
    }
}

fn request_frame(inner: &mut XrInner, frame_callback: &FrameCallback) {
    let Some(session) = inner.session.as_ref() else {
        return;
    };
    let callback = frame_callback.borrow();
    let Some(callback) = callback.as_ref() else {
        return;
    };
    match call1(session, "requestAnimationFrame", callback.as_ref()) {
        Ok(handle) => inner.frame_handle = handle.as_f64(),
        Err(e) => tracing::warn!("Failed to schedule XR frame: {}", e),
    }
}

/// Poll the device once: best hit, live anchor poses and the viewer pose
fn sample_frame(inner: &mut XrInner, frame: &JsValue) -> Option<FrameSample> {
    if frame.is_null() || frame.is_undefined() {
        return None;
    }
    let Some(space) = inner.reference_space.clone() else {
        return Some(FrameSample::default());
    };

    let mut sample = FrameSample::default();

    let source = inner.token.and_then(|token| inner.hit_test_sources.get(&token)).cloned();
    inner.last_hit = None;
    if let Some(source) = source {
        let first = call1(frame, "getHitTestResults", &source)
            .ok()
            .and_then(|results| results.dyn_into::<Array>().ok())
            .map(|results| results.get(0))
            .filter(|first| !first.is_undefined());
        if let Some(first) = first {
            let pose = call1(&first, "getPose", &space).ok().and_then(|p| pose_matrix(&p));
            if let Some(pose) = pose {
                let anchorable = get(&first, "createAnchor").is_ok_and(|f| f.is_function());
                sample.hit = Some(HitSample { pose, anchorable });
                inner.last_hit = Some(first);
            }
        }
    }

    for (id, anchor) in &inner.anchors {
        let pose = get(anchor, "anchorSpace")
            .and_then(|anchor_space| call2(frame, "getPose", &anchor_space, &space))
            .ok()
            .and_then(|p| pose_matrix(&p));
        if let Some(pose) = pose {
            sample.anchor_poses.insert(*id, pose);
        }
    }

    sample.viewer = call1(frame, "getViewerPose", &space).ok().and_then(|p| pose_matrix(&p));
    Some(sample)
}

async fn start_session(config: &SessionConfig) -> Result<JsValue, XrError> {
    let xr = navigator_xr()?;

    let init = Object::new();
    set(&init, "requiredFeatures", &string_array(&config.required_features))?;
    set(&init, "optionalFeatures", &string_array(&config.optional_features))?;

    let document = web_sys::window().and_then(|w| w.document());
    let root = document
        .as_ref()
        .and_then(|d| d.get_element_by_id(&config.overlay_root).map(JsValue::from).or_else(|| d.body().map(JsValue::from)));
    if let Some(root) = root {
        let overlay = Object::new();
        set(&overlay, "root", &root)?;
        set(&init, "domOverlay", &overlay)?;
    }

    let session = call2(&xr, "requestSession", &JsValue::from_str("immersive-ar"), &init)?;
    await_promise(session).await
}

/// Give the session a WebGL base layer. Bevy owns the page canvas, so the
/// layer gets a context on a canvas of its own.
async fn bind_base_layer(session: &JsValue) -> Result<JsValue, XrError> {
    let window = web_sys::window().ok_or_else(|| XrError::Js("no window".to_string()))?;
    let document = window.document().ok_or_else(|| XrError::Js("no document".to_string()))?;
    let canvas = document.create_element("canvas").map_err(js_error)?;

    let attributes = Object::new();
    set(&attributes, "alpha", &JsValue::TRUE)?;
    set(&attributes, "xrCompatible", &JsValue::TRUE)?;
    let gl = call2(&canvas, "getContext", &JsValue::from_str("webgl2"), &attributes)?;
    if gl.is_null() || gl.is_undefined() {
        return Err(XrError::Js("WebGL2 is not available for the XR layer".to_string()));
    }
    await_promise(call0(&gl, "makeXRCompatible")?).await?;

    let constructor = method(&window, "XRWebGLLayer")?;
    let layer = Reflect::construct(&constructor, &Array::of2(session, &gl)).map_err(js_error)?;

    let state = Object::new();
    set(&state, "baseLayer", &layer)?;
    call1(session, "updateRenderState", &state)?;
    Ok(layer)
}

async fn create_hit_test_source(session: &JsValue) -> Result<JsValue, XrError> {
    let viewer = await_promise(call1(session, "requestReferenceSpace", &JsValue::from_str("viewer"))?).await?;
    let options = Object::new();
    set(&options, "space", &viewer)?;
    await_promise(call1(session, "requestHitTestSource", &options)?).await
}

fn select(channel: InputChannel) -> XrEvent {
    XrEvent::Select { channel, at: now() }
}

/// Select events from input source 0, the way a controller object sees them
fn from_first_input_source(session: &JsValue, event: &web_sys::Event) -> bool {
    let Ok(source) = get(event, "inputSource") else {
        return false;
    };
    let first = get(session, "inputSources").and_then(|sources| Reflect::get_u32(&sources, 0).map_err(js_error));
    match first {
        Ok(first) if !first.is_undefined() => Object::is(&source, &first),
        _ => false,
    }
}

fn on_ignored_button(event: &web_sys::Event) -> bool {
    event
        .target()
        .and_then(|target| target.dyn_into::<web_sys::Element>().ok())
        .and_then(|element| element.closest(IGNORED_BUTTON_SELECTOR).ok().flatten())
        .is_some()
}

fn add_listener(
    target: &JsValue,
    event: &'static str,
    options: Option<&web_sys::AddEventListenerOptions>,
    handler: impl FnMut(web_sys::Event) + 'static,
) -> Result<Listener, JsValue> {
    let target: web_sys::EventTarget = target.clone().dyn_into()?;
    let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web_sys::Event)>);
    let callback: &Function = closure.as_ref().unchecked_ref();
    match options {
        Some(options) => {
            target.add_event_listener_with_callback_and_add_event_listener_options(event, callback, options)?
        }
        None => target.add_event_listener_with_callback(event, callback)?,
    }
    Ok(Listener {
        target,
        event,
        closure,
    })
}

fn navigator_xr() -> Result<JsValue, XrError> {
    let window = web_sys::window().ok_or_else(|| XrError::Js("no window".to_string()))?;
    let xr = get(&window.navigator(), "xr")?;
    if xr.is_undefined() || xr.is_null() {
        return Err(XrError::Js("navigator.xr is not available".to_string()));
    }
    Ok(xr)
}

/// `performance.now()` as a duration
fn now() -> Duration {
    let millis = web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0);
    Duration::from_secs_f64(millis.max(0.0) / 1000.0)
}

/// Column-major `XRRigidTransform.matrix` of a pose
fn pose_matrix(pose: &JsValue) -> Option<Mat4> {
    if pose.is_null() || pose.is_undefined() {
        return None;
    }
    let matrix: Float32Array = get(pose, "transform")
        .and_then(|t| get(&t, "matrix"))
        .ok()?
        .dyn_into()
        .ok()?;
    let values = matrix.to_vec();
    (values.len() == 16).then(|| Mat4::from_cols_slice(&values))
}

fn string_array(values: &[String]) -> Array {
    values.iter().map(|v| JsValue::from_str(v)).collect()
}

fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| value.dyn_ref::<js_sys::Error>().map(|e| String::from(e.message())))
        .unwrap_or_else(|| format!("{:?}", value))
}

fn js_error(value: JsValue) -> XrError {
    XrError::Js(js_message(&value))
}

fn get(target: &JsValue, key: &str) -> Result<JsValue, XrError> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(js_error)
}

fn set(target: &JsValue, key: &str, value: &JsValue) -> Result<(), XrError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(js_error)
}

fn method(target: &JsValue, name: &str) -> Result<Function, XrError> {
    get(target, name)?
        .dyn_into::<Function>()
        .map_err(|_| XrError::Js(format!("{} is not a function", name)))
}

fn call0(target: &JsValue, name: &str) -> Result<JsValue, XrError> {
    method(target, name)?.call0(target).map_err(js_error)
}

fn call1(target: &JsValue, name: &str, arg: &JsValue) -> Result<JsValue, XrError> {
    method(target, name)?.call1(target, arg).map_err(js_error)
}

fn call2(target: &JsValue, name: &str, a: &JsValue, b: &JsValue) -> Result<JsValue, XrError> {
    method(target, name)?.call2(target, a, b).map_err(js_error)
}

async fn await_promise(value: JsValue) -> Result<JsValue, XrError> {
    let promise: Promise = value.dyn_into().map_err(js_error)?;
    JsFuture::from(promise).await.map_err(js_error)
}

/// Pumps the event queue once per Bevy frame
pub struct XrPlugin;

impl Plugin for XrPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PreUpdate, pump_xr_events);
    }
}

fn pump_xr_events(bridge: NonSend<XrBridge>) {
    bridge.pump();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_waits_for_base_layer() {
        let mut gate = XrLoopGate::default();
        assert!(!gate.request());
        assert!(!gate.is_open());

        // Binding the layer is what finally schedules frames
        assert!(gate.bind_layer());
        assert!(gate.is_open());
        assert!(!gate.request());
    }

    #[test]
    fn test_loop_starts_when_requested_after_binding() {
        let mut gate = XrLoopGate::default();
        assert!(!gate.bind_layer());
        assert!(gate.request());
        assert!(gate.is_open());
    }

    #[test]
    fn test_stop_cancels_only_a_running_loop() {
        let mut gate = XrLoopGate::default();
        gate.request();
        assert!(!gate.stop());

        gate.bind_layer();
        gate.request();
        assert!(gate.stop());
        assert!(!gate.is_open());
        // Layer stays bound for the rest of the session
        assert!(gate.request());
    }
}
