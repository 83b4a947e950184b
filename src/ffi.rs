//! FFI bindings for the reCAPTCHA native engine
//!
//! This module provides C-compatible functions so the platform plugin shims
//! (GTK, Win32, JNI, Swift) can forward method-channel calls into the engine.
//! All functions use C strings (null-terminated) and return allocated memory
//! that must be freed by the caller using `recaptcha_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double};
use std::ptr;

use crate::channel::{Dispatcher, MethodResponse};
use crate::config::EngineConfig;
use crate::engine::VerificationEngine;
use crate::error::EngineError;
use crate::types::SampleKind;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Opaque handle to a verification engine and its dispatcher
pub struct RecaptchaEngineHandle {
    dispatcher: Dispatcher,
}

/// Create an engine for the current platform with default configuration.
///
/// # Safety
/// - Returns a pointer to a newly allocated engine.
/// - Must be freed with `recaptcha_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_engine_new() -> *mut RecaptchaEngineHandle {
    clear_last_error();

    let handle = Box::new(RecaptchaEngineHandle {
        dispatcher: Dispatcher::new(VerificationEngine::new()),
    });
    Box::into_raw(handle)
}

/// Create an engine from a JSON configuration document.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `recaptcha_engine_free`.
/// - Returns NULL on error; call `recaptcha_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_engine_new_with_config(
    config_json: *const c_char,
) -> *mut RecaptchaEngineHandle {
    clear_last_error();

    let json_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    match EngineConfig::from_json(&json_str).and_then(VerificationEngine::with_config) {
        Ok(engine) => {
            let handle = Box::new(RecaptchaEngineHandle {
                dispatcher: Dispatcher::new(engine),
            });
            Box::into_raw(handle)
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `recaptcha_engine_new*`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_engine_free(engine: *mut RecaptchaEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Method Channel
// ============================================================================

/// Dispatch one method call and return the JSON response envelope.
///
/// The envelope is `{"outcome":"success","value":...}`,
/// `{"outcome":"error","code":...,"message":...,"details":...}` or
/// `{"outcome":"notImplemented"}`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `recaptcha_engine_new*`.
/// - `method` must be a valid null-terminated C string.
/// - `arguments_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `recaptcha_free_string`.
/// - Returns NULL only for invalid pointers; call `recaptcha_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_engine_handle_call(
    engine: *mut RecaptchaEngineHandle,
    method: *const c_char,
    arguments_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    let method_str = match cstr_to_string(method) {
        Some(s) => s,
        None => {
            set_last_error("Invalid method string pointer");
            return ptr::null_mut();
        }
    };

    let arguments = if arguments_json.is_null() {
        None
    } else {
        let args_str = match cstr_to_string(arguments_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid arguments string pointer");
                return ptr::null_mut();
            }
        };
        match serde_json::from_str::<serde_json::Value>(&args_str) {
            Ok(value) => Some(value),
            Err(e) => {
                let response = MethodResponse::from(EngineError::from(e));
                return string_to_cstr(&response.to_json());
            }
        }
    };

    let response = handle.dispatcher.handle(&method_str, arguments.as_ref());
    string_to_cstr(&response.to_json())
}

/// Record a behavioral sample stamped with the engine clock.
///
/// `kind` is one of `pointer-move`, `key-timing`, `tap`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `recaptcha_engine_new*`.
/// - `kind` must be a valid null-terminated C string.
/// - Returns 1 if the sample was buffered, 0 if it was dropped (no open
///   window), -1 on error.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_engine_record_sample(
    engine: *mut RecaptchaEngineHandle,
    kind: *const c_char,
    magnitude: c_double,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &*engine;

    let kind = match cstr_to_string(kind).map(|s| s.parse::<SampleKind>()) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => {
            set_last_error(&e);
            return -1;
        }
        None => {
            set_last_error("Invalid kind string pointer");
            return -1;
        }
    };

    if !magnitude.is_finite() {
        set_last_error("Sample magnitude must be finite");
        return -1;
    }

    if handle.dispatcher.engine().record_sample_now(kind, magnitude) {
        1
    } else {
        0
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by recaptcha functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a recaptcha function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next recaptcha function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn recaptcha_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
