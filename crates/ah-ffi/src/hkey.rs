//! Registry key bindings (Windows)

use std::ptr;

use ah_core::error::RegistryError;
use windows_sys::Win32::Foundation::{
    ERROR_FILE_NOT_FOUND, ERROR_INVALID_DATA, ERROR_NO_MORE_ITEMS, ERROR_SUCCESS,
};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegEnumKeyExW, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_LOCAL_MACHINE,
    KEY_READ, REG_SZ,
};

/// Longest key name the registry allows, in UTF-16 units
const MAX_KEY_NAME: usize = 256;
/// Identifier strings are 38 characters; leave room for padding
const VALUE_BUF_LEN: usize = 128;

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// An open registry key, closed on drop
pub struct RegKey {
    handle: HKEY,
    path: String,
}

impl RegKey {
    /// Open a key below `HKEY_LOCAL_MACHINE` for reading
    pub fn open_local_machine(path: &str) -> Result<Self, RegistryError> {
        Self::open(HKEY_LOCAL_MACHINE, path, path.to_string())
    }

    /// Open a direct sub-key for reading
    pub fn open_subkey(&self, name: &str) -> Result<Self, RegistryError> {
        Self::open(self.handle, name, format!("{}\\{}", self.path, name))
    }

    fn open(parent: HKEY, name: &str, path: String) -> Result<Self, RegistryError> {
        let name = wide(name);
        let mut handle: HKEY = ptr::null_mut();
        // SAFETY: name is NUL-terminated; handle is a valid out pointer
        let status = unsafe { RegOpenKeyExW(parent, name.as_ptr(), 0, KEY_READ, &mut handle) };
        if status != ERROR_SUCCESS {
            return Err(RegistryError::OpenKey { path, code: status });
        }
        Ok(Self { handle, path })
    }

    /// Full path of this key
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the sub-key at `index`, or `None` once enumeration is exhausted
    pub fn enum_subkey(&self, index: u32) -> Result<Option<String>, RegistryError> {
        let mut name = [0u16; MAX_KEY_NAME];
        let mut len = name.len() as u32;
        // SAFETY: buffer and length describe the same allocation
        let status = unsafe {
            RegEnumKeyExW(
                self.handle,
                index,
                name.as_mut_ptr(),
                &mut len,
                ptr::null(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        match status {
            ERROR_SUCCESS => Ok(Some(from_wide(&name[..len as usize]))),
            ERROR_NO_MORE_ITEMS => Ok(None),
            code => Err(RegistryError::Enumerate { index, code }),
        }
    }

    /// Read a string value, `None` if the value does not exist
    pub fn query_string(&self, value: &str) -> Result<Option<String>, RegistryError> {
        let value_name = wide(value);
        let mut data = [0u16; VALUE_BUF_LEN];
        let mut size = std::mem::size_of_val(&data) as u32;
        let mut kind = 0u32;
        // SAFETY: size is the byte length of data
        let status = unsafe {
            RegQueryValueExW(
                self.handle,
                value_name.as_ptr(),
                ptr::null(),
                &mut kind,
                data.as_mut_ptr().cast::<u8>(),
                &mut size,
            )
        };
        let read_error = |code| RegistryError::ReadValue {
            key: self.path.clone(),
            value: value.to_string(),
            code,
        };
        match status {
            ERROR_SUCCESS if kind == REG_SZ => {
                let units = (size as usize / 2).min(data.len());
                Ok(Some(from_wide(&data[..units])))
            }
            ERROR_SUCCESS => Err(read_error(ERROR_INVALID_DATA)),
            ERROR_FILE_NOT_FOUND => Ok(None),
            code => Err(read_error(code)),
        }
    }
}

impl Drop for RegKey {
    fn drop(&mut self) {
        // SAFETY: handle came from a successful RegOpenKeyExW
        unsafe { RegCloseKey(self.handle) };
    }
}
