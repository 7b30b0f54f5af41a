//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Inputs
//! - Requests and configuration are null-terminated UTF-8 JSON strings using
//!   the same field names as [`PdfRequest`] / [`DocumentRequest`] /
//!   [`ForgeConfig`]. A null `config_json` selects the defaults.
//! - Output paths are null-terminated UTF-8 strings.
//!
//! ## Memory management
//! - Strings returned through out-parameters are allocated on the Rust heap
//!   and **must** be freed with `forge_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `forge_last_error`.
//!
//! ## Threading
//! - Each call blocks the calling thread on a private single-threaded tokio
//!   runtime. `forge_last_error` uses a thread-local, so it is safe to call
//!   from multiple threads.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -ldoc_forge
//! // extern int forge_generate_pdf(const char* request_json,
//! //                               const char* output_path,
//! //                               const char* config_json);
//! // extern const char* forge_last_error();
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;

use crate::config::ForgeConfig;
use crate::error::ForgeError;
use crate::model::{DocumentRequest, PdfRequest};
use crate::pipeline::PdfPipeline;
use crate::word::WordPipeline;

/// Bad or null argument.
pub const FORGE_ERR_ARGUMENT: c_int = 1;
/// Request failed validation.
pub const FORGE_ERR_VALIDATION: c_int = 2;
/// Rendering failed.
pub const FORGE_ERR_RENDER: c_int = 3;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg.replace('\0', " ")).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// # Safety
/// `ptr`, if non-null, must point to a valid null-terminated string.
unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("Null pointer argument: {what}"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| format!("Invalid UTF-8 in {what}: {e}"))
}

/// # Safety
/// Same as [`read_str`]; a null pointer yields the default configuration.
unsafe fn read_config(ptr: *const c_char) -> Result<ForgeConfig, ForgeError> {
    if ptr.is_null() {
        return Ok(ForgeConfig::default());
    }
    let json = read_str(ptr, "config_json").map_err(ForgeError::InvalidInput)?;
    ForgeConfig::from_json(json)
}

fn error_code(err: &ForgeError) -> c_int {
    if err.is_validation() {
        FORGE_ERR_VALIDATION
    } else {
        FORGE_ERR_RENDER
    }
}

fn block_on<F: std::future::Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Render a PDF document.
///
/// # Parameters
/// - `request_json`: JSON-encoded PDF request
/// - `output_path`: where the PDF is written
/// - `config_json`: JSON-encoded configuration, or `NULL` for defaults
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `forge_last_error`.
///
/// # Safety
/// Every non-null pointer must point to a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn forge_generate_pdf(
    request_json: *const c_char,
    output_path: *const c_char,
    config_json: *const c_char,
) -> c_int {
    clear_last_error();
    let (request, output) = match (
        read_str(request_json, "request_json"),
        read_str(output_path, "output_path"),
    ) {
        (Ok(r), Ok(o)) => (r, PathBuf::from(o)),
        (Err(e), _) | (_, Err(e)) => {
            set_last_error(&e);
            return FORGE_ERR_ARGUMENT;
        }
    };

    let outcome = read_config(config_json).and_then(|config| {
        let request = PdfRequest::from_json(request)?;
        let pipeline = PdfPipeline::new(config);
        block_on(pipeline.render(&request, &output))?
    });

    match outcome {
        Ok(()) => 0,
        Err(e) => {
            log::error!("PDF generation failed: {e}");
            set_last_error(&e.to_string());
            error_code(&e)
        }
    }
}

/// Render a Word document.
///
/// # Parameters
/// - `request_json`: JSON-encoded document request
/// - `output_path`: where the `.docx` is written
/// - `config_json`: JSON-encoded configuration, or `NULL` for defaults
/// - `out_summary_json`: optional; on success receives a JSON summary of the
///   changes made (free with `forge_free_string`). Pass `NULL` to skip.
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `forge_last_error`.
///
/// # Safety
/// Every non-null string pointer must point to a valid null-terminated string
/// and `out_summary_json`, if non-null, must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn forge_generate_word(
    request_json: *const c_char,
    output_path: *const c_char,
    config_json: *const c_char,
    out_summary_json: *mut *mut c_char,
) -> c_int {
    clear_last_error();
    let (request, output) = match (
        read_str(request_json, "request_json"),
        read_str(output_path, "output_path"),
    ) {
        (Ok(r), Ok(o)) => (r, PathBuf::from(o)),
        (Err(e), _) | (_, Err(e)) => {
            set_last_error(&e);
            return FORGE_ERR_ARGUMENT;
        }
    };

    let outcome = read_config(config_json).and_then(|config| {
        let request = DocumentRequest::from_json(request)?;
        let pipeline = WordPipeline::new(config);
        block_on(pipeline.render(&request, &output))?
    });

    match outcome {
        Ok(summary) => {
            if !out_summary_json.is_null() {
                *out_summary_json = serde_json::to_string(&summary)
                    .ok()
                    .and_then(|json| CString::new(json).ok())
                    .map_or(ptr::null_mut(), CString::into_raw);
            }
            0
        }
        Err(e) => {
            log::error!("Word generation failed: {e}");
            set_last_error(&e.to_string());
            error_code(&e)
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a string returned through an out-parameter.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn forge_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next `forge_*` call on the same
/// thread. The caller should **not** free this pointer – it is managed
/// internally.
///
/// Returns null if the last call succeeded.
#[no_mangle]
pub extern "C" fn forge_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn forge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::WordTemplateBuilder;

    fn last_error() -> String {
        let ptr = forge_last_error();
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string()
    }

    #[test]
    fn ffi_null_input() {
        let output = CString::new("out.pdf").unwrap();
        let rc = unsafe { forge_generate_pdf(ptr::null(), output.as_ptr(), ptr::null()) };
        assert_eq!(rc, FORGE_ERR_ARGUMENT);
        assert!(last_error().contains("request_json"));
    }

    #[test]
    fn ffi_missing_template_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = CString::new(format!(
            r#"{{"template": "{}"}}"#,
            dir.path().join("missing.html").display()
        ))
        .unwrap();
        let output = CString::new(dir.path().join("out.pdf").to_string_lossy().as_ref()).unwrap();

        let rc = unsafe { forge_generate_pdf(request.as_ptr(), output.as_ptr(), ptr::null()) };
        assert_eq!(rc, FORGE_ERR_VALIDATION);
        assert!(last_error().contains("not found"));
    }

    #[test]
    fn ffi_malformed_config_is_rejected() {
        let request = CString::new(r#"{"template": "t.docx"}"#).unwrap();
        let output = CString::new("out.docx").unwrap();
        let config = CString::new("{nope").unwrap();
        let rc = unsafe {
            forge_generate_word(
                request.as_ptr(),
                output.as_ptr(),
                config.as_ptr(),
                ptr::null_mut(),
            )
        };
        assert_eq!(rc, FORGE_ERR_VALIDATION);
        assert!(last_error().contains("configuration"));
    }

    #[test]
    fn ffi_generate_word_returns_summary() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.docx");
        let bytes = WordTemplateBuilder::new()
            .paragraph("Hello {Name}")
            .build()
            .unwrap();
        std::fs::write(&template, bytes).unwrap();
        let request = CString::new(
            serde_json::json!({
                "template": template,
                "placeholders": [{"placeholder": "Name", "content": "Ada"}]
            })
            .to_string(),
        )
        .unwrap();
        let output_path = dir.path().join("out.docx");
        let output = CString::new(output_path.to_string_lossy().as_ref()).unwrap();
        let mut summary: *mut c_char = ptr::null_mut();

        let rc = unsafe {
            forge_generate_word(request.as_ptr(), output.as_ptr(), ptr::null(), &mut summary)
        };
        assert_eq!(rc, 0);
        assert!(forge_last_error().is_null());
        assert!(output_path.exists());

        let json = unsafe { CStr::from_ptr(summary) }.to_str().unwrap();
        assert!(json.contains(r#""tokens_replaced":1"#), "{json}");
        unsafe { forge_free_string(summary) };
    }

    #[test]
    fn ffi_version() {
        let v = forge_version();
        let version = unsafe { CStr::from_ptr(v) }.to_str().unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }
}
