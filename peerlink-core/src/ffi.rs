//! C ABI for linking peerlink-core as a static library into an iOS/Android host.
//! The host owns the native peer session and exposes it as a [`PlBridgeVtable`];
//! its session callbacks feed the adapter through the `pl_inbound_*` functions.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::slice;

use crate::adapter::{NetworkEvent, TransportAdapter};
use crate::bridge::{InboundHandle, NativeBridge};
use crate::channel::{Channel, SendMode};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::identity::PeerId;

pub const PL_OK: c_int = 0;
pub const PL_ERR_NULL: c_int = -1;
pub const PL_ERR_BUFFER_TOO_SMALL: c_int = -2;
pub const PL_ERR_NOT_IMPLEMENTED: c_int = -3;
pub const PL_ERR_NOT_INITIALIZED: c_int = -4;
pub const PL_ERR_ALREADY_STARTED: c_int = -5;
pub const PL_ERR_WRONG_ROLE: c_int = -6;
pub const PL_ERR_INVALID: c_int = -7;

pub const PL_EVENT_IDLE: c_int = 0;
pub const PL_EVENT_CONNECT: c_int = 1;
pub const PL_EVENT_DISCONNECT: c_int = 2;
pub const PL_EVENT_DATA: c_int = 3;

/// Native session functions supplied by the host. `ctx` is passed back verbatim.
/// `send_data` must copy the bytes before returning.
/// `init` receives an inbound handle owned by the host; release it with `pl_inbound_release`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PlBridgeVtable {
    pub ctx: *mut c_void,
    pub init: extern "C" fn(ctx: *mut c_void, service_type: *const c_char, local_id: *const c_char, inbound: *mut c_void),
    pub start_browsing: extern "C" fn(ctx: *mut c_void),
    pub start_advertising: extern "C" fn(ctx: *mut c_void),
    pub send_data: extern "C" fn(ctx: *mut c_void, peer_id: u64, data: *const u8, len: usize, channel: c_int),
    pub disconnect_all_peers: extern "C" fn(ctx: *mut c_void),
}

/// Bridge calling into host function pointers.
pub struct ForeignBridge {
    vtable: PlBridgeVtable,
}

// The host guarantees its session functions and ctx may be used from any thread.
unsafe impl Send for ForeignBridge {}
unsafe impl Sync for ForeignBridge {}

impl NativeBridge for ForeignBridge {
    fn init(&self, service_type: &str, local_id: &str, inbound: InboundHandle) {
        let (Ok(service_type), Ok(local_id)) = (CString::new(service_type), CString::new(local_id)) else {
            tracing::error!("service type or local id contains a NUL byte");
            return;
        };
        let inbound = Box::into_raw(Box::new(inbound)) as *mut c_void;
        (self.vtable.init)(self.vtable.ctx, service_type.as_ptr(), local_id.as_ptr(), inbound);
    }

    fn start_browsing(&self) {
        (self.vtable.start_browsing)(self.vtable.ctx);
    }

    fn start_advertising(&self) {
        (self.vtable.start_advertising)(self.vtable.ctx);
    }

    fn send_data(&self, peer: PeerId, payload: Vec<u8>, channel: Channel) {
        (self.vtable.send_data)(
            self.vtable.ctx,
            peer.get(),
            payload.as_ptr(),
            payload.len(),
            channel.get(),
        );
    }

    fn disconnect_all_peers(&self) {
        (self.vtable.disconnect_all_peers)(self.vtable.ctx);
    }
}

/// Adapter plus an event the host could not take because its buffer was too small.
struct FfiAdapter {
    adapter: TransportAdapter<ForeignBridge>,
    stash: Option<NetworkEvent>,
}

fn error_code(e: &TransportError) -> c_int {
    match e {
        TransportError::NotInitialized => PL_ERR_NOT_INITIALIZED,
        TransportError::AlreadyStarted { .. } => PL_ERR_ALREADY_STARTED,
        TransportError::WrongRole { .. } => PL_ERR_WRONG_ROLE,
        TransportError::NotImplemented(_) => PL_ERR_NOT_IMPLEMENTED,
        TransportError::InvalidServiceType(_) | TransportError::InvalidPeerId(_) => PL_ERR_INVALID,
    }
}

fn status(r: Result<(), TransportError>) -> c_int {
    match r {
        Ok(()) => PL_OK,
        Err(e) => error_code(&e),
    }
}

/// Crate version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn pl_core_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// 0 = reliable, 1 = unreliable.
#[no_mangle]
pub extern "C" fn pl_channel_send_mode(channel: c_int) -> c_int {
    match Channel(channel).send_mode() {
        SendMode::Reliable => 0,
        SendMode::Unreliable => 1,
    }
}

/// Create an adapter. `service_type` may be null for the default. Returns null if it is not UTF-8.
#[no_mangle]
pub extern "C" fn pl_adapter_create(vtable: PlBridgeVtable, service_type: *const c_char) -> *mut c_void {
    let config = if service_type.is_null() {
        TransportConfig::default()
    } else {
        match unsafe { CStr::from_ptr(service_type) }.to_str() {
            Ok(s) => TransportConfig::with_service_type(s),
            Err(_) => return std::ptr::null_mut(),
        }
    };
    let adapter = TransportAdapter::new(config, ForeignBridge { vtable });
    Box::into_raw(Box::new(FfiAdapter {
        adapter,
        stash: None,
    })) as *mut c_void
}

/// Destroy an adapter. No-op if h is null. Inbound handles stay valid until released.
#[no_mangle]
pub extern "C" fn pl_adapter_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut FfiAdapter) };
}

/// Initialize. A bad service type is logged and leaves the local id at 0.
#[no_mangle]
pub extern "C" fn pl_adapter_init(h: *mut c_void) -> c_int {
    if h.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    a.adapter.init();
    PL_OK
}

#[no_mangle]
pub extern "C" fn pl_adapter_start_server(h: *mut c_void) -> c_int {
    if h.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    status(a.adapter.start_server())
}

#[no_mangle]
pub extern "C" fn pl_adapter_start_client(h: *mut c_void) -> c_int {
    if h.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    status(a.adapter.start_client())
}

/// Local peer id, or 0 if h is null or init has not succeeded.
#[no_mangle]
pub extern "C" fn pl_adapter_local_id(h: *mut c_void) -> u64 {
    if h.is_null() {
        return 0;
    }
    let a = unsafe { &*(h as *const FfiAdapter) };
    a.adapter.local_id().get()
}

#[no_mangle]
pub extern "C" fn pl_adapter_server_id(h: *mut c_void) -> u64 {
    if h.is_null() {
        return 0;
    }
    let a = unsafe { &*(h as *const FfiAdapter) };
    a.adapter.server_id().get()
}

/// Poll one event. Returns PL_EVENT_* or a negative error.
/// Idle reports peer 0, length 0 and channel 255 (`Channel::UNUSED`); the channel of an
/// Idle event carries no meaning and must not be read as `Channel::INTERNAL`. For Data, the payload is copied to out_buf;
/// if out_buf_len is too small, returns PL_ERR_BUFFER_TOO_SMALL with out_len set to the
/// needed size and keeps the event for the next call. out_receive_secs may be null.
#[no_mangle]
pub extern "C" fn pl_adapter_poll(
    h: *mut c_void,
    out_peer: *mut u64,
    out_channel: *mut c_int,
    out_buf: *mut u8,
    out_buf_len: usize,
    out_len: *mut usize,
    out_receive_secs: *mut f32,
) -> c_int {
    if h.is_null() || out_peer.is_null() || out_channel.is_null() || out_len.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    let event = match a.stash.take() {
        Some(e) => e,
        None => a.adapter.poll_event(),
    };
    let (kind, peer, channel, time) = match &event {
        NetworkEvent::Idle => (PL_EVENT_IDLE, PeerId::NONE, Channel::UNUSED, a.adapter.elapsed()),
        NetworkEvent::Connect { peer, channel, receive_time } => (PL_EVENT_CONNECT, *peer, *channel, *receive_time),
        NetworkEvent::Disconnect { peer, channel, receive_time } => (PL_EVENT_DISCONNECT, *peer, *channel, *receive_time),
        NetworkEvent::Data { peer, channel, receive_time, .. } => (PL_EVENT_DATA, *peer, *channel, *receive_time),
    };
    let payload: &[u8] = match &event {
        NetworkEvent::Data { payload, .. } => payload.as_slice(),
        _ => &[],
    };
    if !payload.is_empty() && (out_buf.is_null() || out_buf_len < payload.len()) {
        unsafe {
            *out_len = payload.len();
        }
        a.stash = Some(event);
        return PL_ERR_BUFFER_TOO_SMALL;
    }
    unsafe {
        if !payload.is_empty() {
            out_buf.copy_from_nonoverlapping(payload.as_ptr(), payload.len());
        }
        *out_len = payload.len();
        *out_peer = peer.get();
        *out_channel = channel.get();
        if !out_receive_secs.is_null() {
            *out_receive_secs = time.as_secs_f32();
        }
    }
    kind
}

/// Send `len` bytes to `peer_id`. The bytes are copied before this returns.
#[no_mangle]
pub extern "C" fn pl_adapter_send(h: *mut c_void, peer_id: u64, data: *const u8, len: usize, channel: c_int) -> c_int {
    if h.is_null() || (data.is_null() && len > 0) {
        return PL_ERR_NULL;
    }
    let a = unsafe { &*(h as *const FfiAdapter) };
    let payload: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(data, len) }
    };
    a.adapter.send(PeerId(peer_id), payload, Channel(channel));
    PL_OK
}

/// Always 0: the native session does not measure round-trip time.
#[no_mangle]
pub extern "C" fn pl_adapter_current_rtt_ms(h: *mut c_void, peer_id: u64) -> u64 {
    if h.is_null() {
        return 0;
    }
    let a = unsafe { &*(h as *const FfiAdapter) };
    a.adapter.current_rtt(PeerId(peer_id)).as_millis() as u64
}

/// Server only; disconnects every peer (see `TransportAdapter::disconnect_remote_client`).
#[no_mangle]
pub extern "C" fn pl_adapter_disconnect_remote_client(h: *mut c_void, peer_id: u64) -> c_int {
    if h.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    status(a.adapter.disconnect_remote_client(PeerId(peer_id)))
}

/// Always PL_ERR_NOT_IMPLEMENTED for a valid handle.
#[no_mangle]
pub extern "C" fn pl_adapter_disconnect_local_client(h: *mut c_void) -> c_int {
    if h.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    status(a.adapter.disconnect_local_client())
}

/// Always PL_ERR_NOT_IMPLEMENTED for a valid handle.
#[no_mangle]
pub extern "C" fn pl_adapter_shutdown(h: *mut c_void) -> c_int {
    if h.is_null() {
        return PL_ERR_NULL;
    }
    let a = unsafe { &mut *(h as *mut FfiAdapter) };
    status(a.adapter.shutdown())
}

/// Session callback: the server accepted this client. Safe from any thread.
#[no_mangle]
pub extern "C" fn pl_inbound_connection_accepted(inbound: *mut c_void, server_id: u64) -> c_int {
    if inbound.is_null() {
        return PL_ERR_NULL;
    }
    let handle = unsafe { &*(inbound as *const InboundHandle) };
    handle.on_connection_accepted(PeerId(server_id));
    PL_OK
}

/// Session callback: a peer left. Safe from any thread.
#[no_mangle]
pub extern "C" fn pl_inbound_peer_disconnected(inbound: *mut c_void, peer_id: u64) -> c_int {
    if inbound.is_null() {
        return PL_ERR_NULL;
    }
    let handle = unsafe { &*(inbound as *const InboundHandle) };
    handle.on_peer_disconnected(PeerId(peer_id));
    PL_OK
}

/// Session callback: data from a peer. Bytes are copied before returning. Safe from any thread.
#[no_mangle]
pub extern "C" fn pl_inbound_data_received(
    inbound: *mut c_void,
    peer_id: u64,
    data: *const u8,
    len: usize,
    channel: c_int,
) -> c_int {
    if inbound.is_null() || (data.is_null() && len > 0) {
        return PL_ERR_NULL;
    }
    let handle = unsafe { &*(inbound as *const InboundHandle) };
    let payload = if len == 0 {
        Vec::new()
    } else {
        unsafe { slice::from_raw_parts(data, len) }.to_vec()
    };
    handle.on_data_received(PeerId(peer_id), payload, Channel(channel));
    PL_OK
}

/// Release an inbound handle passed to the host's `init`. No-op if null.
#[no_mangle]
pub extern "C" fn pl_inbound_release(inbound: *mut c_void) {
    if inbound.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(inbound as *mut InboundHandle) };
}
