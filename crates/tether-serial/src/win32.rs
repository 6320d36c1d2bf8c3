//! Win32 overlapped handle for serial ports and named pipes.

use std::io;
use std::iter;
use std::mem;

use windows::core::PCWSTR;
use windows::Win32::Devices::Communication::{SetCommTimeouts, COMMTIMEOUTS};
use windows::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_INSUFFICIENT_BUFFER, ERROR_IO_INCOMPLETE, ERROR_IO_PENDING,
    GENERIC_READ, GENERIC_WRITE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, QueryDosDeviceW, ReadFile, WriteFile, FILE_FLAG_OVERLAPPED, FILE_SHARE_MODE,
    OPEN_EXISTING,
};
use windows::Win32::System::Threading::CreateEventW;
use windows::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

use crate::overlapped::{OverlappedIo, Submitted};
use crate::path::{classify, device_namespace_path, is_serial_port, WindowsEndpoint};

/// Largest `QueryDosDevice` buffer tried before giving up.
const MAX_DOS_DEVICE_BUFFER: usize = 1 << 20;

fn to_io(error: windows::core::Error) -> io::Error {
    // Win32 errors travel as FACILITY_WIN32 HRESULTs; the low word is the code.
    io::Error::from_raw_os_error(error.code().0 & 0xFFFF)
}

/// An open handle with one `OVERLAPPED` per direction.
///
/// The `OVERLAPPED` blocks are boxed so their addresses survive moves of the
/// port while a request is in flight.
pub struct Win32Port {
    handle: HANDLE,
    read: Box<OVERLAPPED>,
    write: Box<OVERLAPPED>,
    read_in_flight: bool,
    write_in_flight: bool,
}

// The handle has a single owner and is only used from the thread driving
// the link.
unsafe impl Send for Win32Port {}

impl Win32Port {
    /// Open a `COMn` port or a `\\host\pipe\name` named pipe.
    pub fn open(path: &str) -> io::Result<Self> {
        let endpoint = classify(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a serial port or named pipe",
            )
        })?;

        let target = device_namespace_path(path);
        let wide: Vec<u16> = target.encode_utf16().chain(iter::once(0)).collect();
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_MODE(0),
                None,
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                None,
            )
        }
        .map_err(to_io)?;

        // From here on, Drop releases whatever has been created.
        let mut port = Self {
            handle,
            read: Box::new(unsafe { mem::zeroed() }),
            write: Box::new(unsafe { mem::zeroed() }),
            read_in_flight: false,
            write_in_flight: false,
        };
        port.read.hEvent =
            unsafe { CreateEventW(None, true, false, PCWSTR::null()) }.map_err(to_io)?;
        port.write.hEvent =
            unsafe { CreateEventW(None, true, false, PCWSTR::null()) }.map_err(to_io)?;

        if endpoint == WindowsEndpoint::SerialPort {
            // Return whatever has arrived, waiting at most 1ms when nothing has.
            let timeouts = COMMTIMEOUTS {
                ReadIntervalTimeout: u32::MAX,
                ReadTotalTimeoutMultiplier: u32::MAX,
                ReadTotalTimeoutConstant: 1,
                WriteTotalTimeoutMultiplier: 0,
                WriteTotalTimeoutConstant: 0,
            };
            unsafe { SetCommTimeouts(port.handle, &timeouts) }.map_err(to_io)?;
        }

        Ok(port)
    }

    fn rearm(overlapped: &mut OVERLAPPED) {
        let event = overlapped.hEvent;
        *overlapped = unsafe { mem::zeroed() };
        overlapped.hEvent = event;
    }

    fn poll(&self, overlapped: &OVERLAPPED) -> io::Result<Option<usize>> {
        let mut transferred = 0u32;
        match unsafe { GetOverlappedResult(self.handle, overlapped, &mut transferred, false) } {
            Ok(()) => Ok(Some(transferred as usize)),
            Err(e) if e.code() == ERROR_IO_INCOMPLETE.to_hresult() => Ok(None),
            Err(e) => Err(to_io(e)),
        }
    }

    /// Cancel one request and wait until the kernel lets go of it.
    fn cancel(&self, overlapped: &OVERLAPPED) {
        let mut transferred = 0u32;
        unsafe {
            let _ = CancelIoEx(self.handle, Some(overlapped));
            let _ = GetOverlappedResult(self.handle, overlapped, &mut transferred, true);
        }
    }
}

impl OverlappedIo for Win32Port {
    unsafe fn start_read(&mut self, buf: *mut u8, len: usize) -> io::Result<Submitted> {
        let len = len.min(u32::MAX as usize);
        Self::rearm(&mut self.read);
        let buf = std::slice::from_raw_parts_mut(buf, len);
        let overlapped: *mut OVERLAPPED = &mut *self.read;
        match ReadFile(self.handle, Some(buf), None, Some(overlapped)) {
            Ok(()) => Ok(Submitted::Complete(self.poll(&self.read)?.unwrap_or(0))),
            Err(e) if e.code() == ERROR_IO_PENDING.to_hresult() => {
                self.read_in_flight = true;
                Ok(Submitted::Pending)
            }
            Err(e) => Err(to_io(e)),
        }
    }

    fn poll_read(&mut self) -> io::Result<Option<usize>> {
        if !self.read_in_flight {
            return Ok(None);
        }
        let result = self.poll(&self.read);
        if !matches!(result, Ok(None)) {
            self.read_in_flight = false;
        }
        result
    }

    unsafe fn start_write(&mut self, buf: *const u8, len: usize) -> io::Result<Submitted> {
        let len = len.min(u32::MAX as usize);
        Self::rearm(&mut self.write);
        let buf = std::slice::from_raw_parts(buf, len);
        let overlapped: *mut OVERLAPPED = &mut *self.write;
        match WriteFile(self.handle, Some(buf), None, Some(overlapped)) {
            Ok(()) => Ok(Submitted::Complete(self.poll(&self.write)?.unwrap_or(0))),
            Err(e) if e.code() == ERROR_IO_PENDING.to_hresult() => {
                self.write_in_flight = true;
                Ok(Submitted::Pending)
            }
            Err(e) => Err(to_io(e)),
        }
    }

    fn poll_write(&mut self) -> io::Result<Option<usize>> {
        if !self.write_in_flight {
            return Ok(None);
        }
        let result = self.poll(&self.write);
        if !matches!(result, Ok(None)) {
            self.write_in_flight = false;
        }
        result
    }

    fn cancel_all(&mut self) {
        if self.read_in_flight {
            self.cancel(&self.read);
            self.read_in_flight = false;
        }
        if self.write_in_flight {
            self.cancel(&self.write);
            self.write_in_flight = false;
        }
    }
}

impl Drop for Win32Port {
    fn drop(&mut self) {
        self.cancel_all();
        unsafe {
            for event in [self.read.hEvent, self.write.hEvent] {
                if !event.is_invalid() {
                    let _ = CloseHandle(event);
                }
            }
            let _ = CloseHandle(self.handle);
        }
    }
}

/// `COMn` names known to the DOS device namespace, in port order.
pub fn enumerate() -> Vec<String> {
    let mut buf = vec![0u16; 16 * 1024];
    let len = loop {
        let n = unsafe { QueryDosDeviceW(PCWSTR::null(), Some(&mut buf)) } as usize;
        if n != 0 {
            break n;
        }
        if unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER
            || buf.len() >= MAX_DOS_DEVICE_BUFFER
        {
            log::debug!("QueryDosDevice failed");
            return Vec::new();
        }
        let grown = buf.len() * 2;
        buf.resize(grown, 0);
    };

    let mut ports: Vec<String> = buf[..len]
        .split(|&c| c == 0)
        .filter(|name| !name.is_empty())
        .map(String::from_utf16_lossy)
        .filter(|name| is_serial_port(name))
        .collect();
    ports.sort_by_key(|name| name[3..].parse::<u32>().unwrap_or(u32::MAX));
    ports.dedup();
    ports
}
