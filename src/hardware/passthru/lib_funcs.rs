//! Function table of a loaded J2534 (04.04) library

use j2534_rust::{FilterType, IoctlID, PASSTHRU_MSG, PassthruError, Protocol};
use libloading::Library;
use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Result which contains a PASSTHRU_ERROR in it's Err() variant
pub type PassthruResult<T> = Result<T, PassthruError>;

type PassThruOpenFn = unsafe extern "system" fn(name: *const c_void, device_id: *mut u32) -> i32;
type PassThruCloseFn = unsafe extern "system" fn(device_id: u32) -> i32;
type PassThruConnectFn = unsafe extern "system" fn(
    device_id: u32,
    protocol_id: u32,
    flags: u32,
    baudrate: u32,
    channel_id: *mut u32,
) -> i32;
type PassThruDisconnectFn = unsafe extern "system" fn(channel_id: u32) -> i32;
type PassThruMsgsFn = unsafe extern "system" fn(
    channel_id: u32,
    msgs: *mut PASSTHRU_MSG,
    num_msgs: *mut u32,
    timeout: u32,
) -> i32;
type PassThruStartMsgFilterFn = unsafe extern "system" fn(
    channel_id: u32,
    filter_type: u32,
    m_msg: *const PASSTHRU_MSG,
    p_msg: *const PASSTHRU_MSG,
    fc_msg: *const PASSTHRU_MSG,
    filter_id: *mut u32,
) -> i32;
type PassThruReadVersionFn = unsafe extern "system" fn(
    device_id: u32,
    firmware_version: *mut c_char,
    dll_version: *mut c_char,
    api_version: *mut c_char,
) -> i32;
type PassThruGetLastErrorFn = unsafe extern "system" fn(error_description: *mut c_char) -> i32;
type PassThruIoctlFn = unsafe extern "system" fn(
    handle_id: u32,
    ioctl_id: u32,
    input: *mut c_void,
    output: *mut c_void,
) -> i32;

/// Version strings reported by the library
#[derive(Debug, Clone)]
pub struct DrvVersion {
    /// Library (DLL) Version
    pub dll_version: String,
    /// Passthru API Version
    pub api_version: String,
    /// Device Firmware version
    pub fw_version: String,
}

/// The library functions used for VPW
#[derive(Clone)]
pub struct PassthruDrv {
    lib: Arc<Library>,
    open_fn: PassThruOpenFn,
    close_fn: PassThruCloseFn,
    connect_fn: PassThruConnectFn,
    disconnect_fn: PassThruDisconnectFn,
    read_msg_fn: PassThruMsgsFn,
    write_msg_fn: PassThruMsgsFn,
    start_filter_fn: PassThruStartMsgFilterFn,
    get_last_err_fn: PassThruGetLastErrorFn,
    ioctl_fn: PassThruIoctlFn,
    read_version_fn: PassThruReadVersionFn,
}

impl fmt::Debug for PassthruDrv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthruDrv").field("library", &self.lib).finish()
    }
}

/// Maps a J2534 status code onto a result
fn ret_res<T>(res: i32, ret: T) -> PassthruResult<T> {
    if res == 0 {
        return Ok(ret);
    }
    log::error!("Function call failed with status {res}");
    // Codes outside the 04.04 table are reported as a generic failure
    Err(PassthruError::try_from(res as u32).unwrap_or(PassthruError::ERR_FAILED))
}

/// Reads a NUL terminated string out of a fixed size buffer the library filled
fn buffer_to_string(buf: &[u8]) -> String {
    CStr::from_bytes_until_nul(buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(buf).into_owned())
}

/// Looks up one exported function
///
/// # Safety
/// `T` must match the signature of the exported symbol
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    unsafe { Ok(*lib.get::<T>(name)?) }
}

impl PassthruDrv {
    /// Loads the library at `path` and resolves the functions used for VPW
    pub fn load_lib(path: &Path) -> Result<PassthruDrv, libloading::Error> {
        log::debug!("Opening function library {}", path.display());
        unsafe {
            let lib = Library::new(path)?;
            Ok(PassthruDrv {
                open_fn: symbol(&lib, b"PassThruOpen\0")?,
                close_fn: symbol(&lib, b"PassThruClose\0")?,
                connect_fn: symbol(&lib, b"PassThruConnect\0")?,
                disconnect_fn: symbol(&lib, b"PassThruDisconnect\0")?,
                read_msg_fn: symbol(&lib, b"PassThruReadMsgs\0")?,
                write_msg_fn: symbol(&lib, b"PassThruWriteMsgs\0")?,
                start_filter_fn: symbol(&lib, b"PassThruStartMsgFilter\0")?,
                get_last_err_fn: symbol(&lib, b"PassThruGetLastError\0")?,
                ioctl_fn: symbol(&lib, b"PassThruIoctl\0")?,
                read_version_fn: symbol(&lib, b"PassThruReadVersion\0")?,
                lib: Arc::new(lib),
            })
        }
    }

    /// Opens the first device the library knows about. Returns the device ID
    pub fn open(&self) -> PassthruResult<u32> {
        log::debug!("PT_OPEN called");
        let mut id: u32 = 0;
        let res = unsafe { (self.open_fn)(std::ptr::null(), &mut id) };
        ret_res(res, id)
    }

    /// Closes a device opened with [PassthruDrv::open]
    pub fn close(&self, dev_id: u32) -> PassthruResult<()> {
        log::debug!("PT_CLOSE called. Device ID: {dev_id}");
        ret_res(unsafe { (self.close_fn)(dev_id) }, ())
    }

    /// Connects a protocol channel. Returns the channel ID
    pub fn connect(
        &self,
        dev_id: u32,
        protocol: Protocol,
        flags: u32,
        baud: u32,
    ) -> PassthruResult<u32> {
        log::debug!(
            "PT_CONNECT called. Device ID {dev_id}, protocol {protocol}, flags: {flags:08X?}, \
             baud: {baud}"
        );
        let mut channel_id: u32 = 0;
        let res =
            unsafe { (self.connect_fn)(dev_id, protocol as u32, flags, baud, &mut channel_id) };
        ret_res(res, channel_id)
    }

    /// Disconnects a protocol channel
    pub fn disconnect(&self, channel_id: u32) -> PassthruResult<()> {
        log::debug!("PT_DISCONNECT called. Channel ID {channel_id}");
        ret_res(unsafe { (self.disconnect_fn)(channel_id) }, ())
    }

    /// Writes messages, returning how many the library accepted
    pub fn write_messages(
        &self,
        channel_id: u32,
        msgs: &mut [PASSTHRU_MSG],
        timeout: u32,
    ) -> PassthruResult<usize> {
        log::debug!(
            "PT_WRITE_MSGS called. Channel ID: {channel_id}, {} msgs, Timeout {timeout}",
            msgs.len()
        );
        if msgs.is_empty() {
            return Ok(0);
        }
        let mut msg_count = msgs.len() as u32;
        let res =
            unsafe { (self.write_msg_fn)(channel_id, msgs.as_mut_ptr(), &mut msg_count, timeout) };
        ret_res(res, msg_count as usize)
    }

    /// Reads up to `max_msgs` messages. An empty buffer or a timeout is an empty list
    pub fn read_messages(
        &self,
        channel_id: u32,
        max_msgs: u32,
        timeout: u32,
    ) -> PassthruResult<Vec<PASSTHRU_MSG>> {
        let mut msg_count = max_msgs;
        let mut msgs = vec![PASSTHRU_MSG::default(); max_msgs as usize];
        let res =
            unsafe { (self.read_msg_fn)(channel_id, msgs.as_mut_ptr(), &mut msg_count, timeout) };
        msgs.truncate(msg_count as usize);
        if res == PassthruError::ERR_BUFFER_EMPTY as i32
            || res == PassthruError::ERR_TIMEOUT as i32
        {
            return Ok(msgs);
        }
        ret_res(res, msgs)
    }

    /// Reads the library, API and firmware versions
    pub fn get_version(&self, dev_id: u32) -> PassthruResult<DrvVersion> {
        log::debug!("PT_GET_VERSION called. Device ID {dev_id}");
        let mut firmware_version = [0u8; 80];
        let mut dll_version = [0u8; 80];
        let mut api_version = [0u8; 80];
        let res = unsafe {
            (self.read_version_fn)(
                dev_id,
                firmware_version.as_mut_ptr() as *mut c_char,
                dll_version.as_mut_ptr() as *mut c_char,
                api_version.as_mut_ptr() as *mut c_char,
            )
        };
        ret_res(
            res,
            DrvVersion {
                api_version: buffer_to_string(&api_version),
                dll_version: buffer_to_string(&dll_version),
                fw_version: buffer_to_string(&firmware_version),
            },
        )
    }

    /// Description of the last ERR_FAILED
    pub fn get_last_error(&self) -> PassthruResult<String> {
        let mut err = [0u8; 80];
        let res = unsafe { (self.get_last_err_fn)(err.as_mut_ptr() as *mut c_char) };
        ret_res(res, buffer_to_string(&err))
    }

    /// Raw IOCTL call
    pub fn ioctl(
        &self,
        handle_id: u32,
        ioctl_id: IoctlID,
        input: *mut c_void,
        output: *mut c_void,
    ) -> PassthruResult<()> {
        log::debug!("PT_IOCTL called. handle ID {handle_id}, IOCTL ID {ioctl_id}");
        let res = unsafe { (self.ioctl_fn)(handle_id, ioctl_id as u32, input, output) };
        ret_res(res, ())
    }

    /// Starts a pass or block filter. Returns the filter ID
    pub fn start_msg_filter(
        &self,
        channel_id: u32,
        filter_type: FilterType,
        mask: &PASSTHRU_MSG,
        pattern: &PASSTHRU_MSG,
    ) -> PassthruResult<u32> {
        log::debug!("PT_START_MSG_FILTER called. Channel ID {channel_id}");
        let mut filter_id: u32 = 0;
        let res = unsafe {
            (self.start_filter_fn)(
                channel_id,
                filter_type as u32,
                mask,
                pattern,
                std::ptr::null(),
                &mut filter_id,
            )
        };
        ret_res(res, filter_id)
    }
}
