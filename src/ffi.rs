//! FFI bindings for Session Lens
//!
//! This module provides C-compatible functions for calling the analyzer from
//! other languages. All functions take and return JSON as null-terminated C
//! strings; returned strings are allocated here and must be freed by the
//! caller using `lens_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::AnalysisError;
use crate::patterns::PatternConfig;
use crate::pipeline::{
    analyze_json, overview_json, page_analysis_json, parse_day, parse_events, parse_meta,
    trends_json, SessionAnalyzer,
};
use crate::types::SessionMeta;
use chrono::Utc;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Borrow a C string as UTF-8; `None` for NULL or invalid UTF-8
unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Hand a Rust string to the caller (caller must free); NULL + last error
/// when it holds an interior NUL
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(e) => {
            set_last_error(&format!(
                "Result contains a NUL byte at position {}",
                e.nul_position()
            ));
            ptr::null_mut()
        }
    }
}

/// Map a JSON result onto the C convention: string or NULL + last error
fn into_c_result(result: Result<String, AnalysisError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Analyze one session and return the `AnalysisResult` JSON.
///
/// # Safety
/// - `events_json` must be a valid null-terminated C string holding a JSON
///   array of recorder events.
/// - `meta_json` may be NULL; otherwise it must be a valid null-terminated C
///   string holding a JSON object.
/// - Returns a newly allocated string that must be freed with `lens_free_string`.
/// - Returns NULL on error; call `lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lens_analyze_session(
    events_json: *const c_char,
    meta_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(events) = cstr_to_str(events_json) else {
        set_last_error("Invalid events JSON string pointer");
        return ptr::null_mut();
    };

    let meta = if meta_json.is_null() {
        None
    } else {
        match cstr_to_str(meta_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid meta JSON string pointer");
                return ptr::null_mut();
            }
        }
    };

    into_c_result(analyze_json(events, meta))
}

/// Analyze a batch of sessions and return the `InsightOverview` JSON.
///
/// # Safety
/// - `sessions_json` must be a valid null-terminated C string holding a JSON
///   array of `{"session_id", "meta", "events"}` objects.
/// - Returns a newly allocated string that must be freed with `lens_free_string`.
/// - Returns NULL on error; call `lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lens_overview(sessions_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(sessions) = cstr_to_str(sessions_json) else {
        set_last_error("Invalid sessions JSON string pointer");
        return ptr::null_mut();
    };

    into_c_result(overview_json(sessions))
}

/// Analyze one URL across a batch of sessions and return the `PageAnalysis` JSON.
///
/// # Safety
/// - `page_url` must be a valid null-terminated C string.
/// - `sessions_json` follows the rules of `lens_overview`.
/// - Returns a newly allocated string that must be freed with `lens_free_string`.
/// - Returns NULL on error; call `lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lens_page_analysis(
    page_url: *const c_char,
    sessions_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(page_url) = cstr_to_str(page_url) else {
        set_last_error("Invalid page URL string pointer");
        return ptr::null_mut();
    };
    let Some(sessions) = cstr_to_str(sessions_json) else {
        set_last_error("Invalid sessions JSON string pointer");
        return ptr::null_mut();
    };

    into_c_result(page_analysis_json(page_url, sessions))
}

/// Bucket a batch of sessions by start day and return the `Trends` JSON.
///
/// # Safety
/// - `sessions_json` follows the rules of `lens_overview`.
/// - `days` is clamped to 1..=90.
/// - `today` may be NULL for the current UTC date; otherwise it must be a
///   valid null-terminated `YYYY-MM-DD` C string.
/// - Returns a newly allocated string that must be freed with `lens_free_string`.
/// - Returns NULL on error; call `lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lens_trends(
    sessions_json: *const c_char,
    days: u32,
    today: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(sessions) = cstr_to_str(sessions_json) else {
        set_last_error("Invalid sessions JSON string pointer");
        return ptr::null_mut();
    };
    let today = if today.is_null() {
        Ok(Utc::now().date_naive())
    } else {
        match cstr_to_str(today) {
            Some(day) => parse_day(day),
            None => {
                set_last_error("Invalid day string pointer");
                return ptr::null_mut();
            }
        }
    };

    into_c_result(today.and_then(|today| trends_json(sessions, days, today)))
}

// ============================================================================
// Configured Analyzer API
// ============================================================================

/// Opaque handle to a SessionAnalyzer with its own pattern tables
pub struct LensAnalyzerHandle {
    analyzer: SessionAnalyzer,
}

/// Create an analyzer.
///
/// # Safety
/// - `patterns_json` may be NULL for the built-in pattern tables; otherwise it
///   must be a valid null-terminated C string holding a pattern configuration.
/// - Returns a pointer that must be freed with `lens_analyzer_free`.
/// - Returns NULL on error; call `lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lens_analyzer_new(patterns_json: *const c_char) -> *mut LensAnalyzerHandle {
    clear_last_error();

    let analyzer = if patterns_json.is_null() {
        SessionAnalyzer::new()
    } else {
        let Some(json) = cstr_to_str(patterns_json) else {
            set_last_error("Invalid patterns JSON string pointer");
            return ptr::null_mut();
        };
        match PatternConfig::from_json(json).and_then(|config| SessionAnalyzer::from_config(&config)) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(LensAnalyzerHandle { analyzer }))
}

/// Free an analyzer.
///
/// # Safety
/// - `analyzer` must be a pointer returned by `lens_analyzer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn lens_analyzer_free(analyzer: *mut LensAnalyzerHandle) {
    if !analyzer.is_null() {
        drop(Box::from_raw(analyzer));
    }
}

/// Analyze one session with a configured analyzer.
///
/// # Safety
/// - `analyzer` must be a valid pointer returned by `lens_analyzer_new`.
/// - `events_json` and `meta_json` follow the rules of `lens_analyze_session`.
/// - Returns a newly allocated string that must be freed with `lens_free_string`.
/// - Returns NULL on error; call `lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lens_analyzer_analyze(
    analyzer: *const LensAnalyzerHandle,
    events_json: *const c_char,
    meta_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if analyzer.is_null() {
        set_last_error("Null analyzer pointer");
        return ptr::null_mut();
    }
    let handle = &*analyzer;

    let Some(events) = cstr_to_str(events_json) else {
        set_last_error("Invalid events JSON string pointer");
        return ptr::null_mut();
    };
    let meta = if meta_json.is_null() {
        Ok(SessionMeta::default())
    } else {
        match cstr_to_str(meta_json) {
            Some(s) => parse_meta(s),
            None => {
                set_last_error("Invalid meta JSON string pointer");
                return ptr::null_mut();
            }
        }
    };

    let result = parse_events(events).and_then(|records| {
        let meta = meta?;
        let result = handle.analyzer.analyze(&records, &meta);
        Ok(serde_json::to_string(&result)?)
    });
    into_c_result(result)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `lens_*` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `lens_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn lens_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next `lens_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn lens_last_error() -> *const c_char {
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
pub unsafe extern "C" fn lens_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_events() -> CString {
        CString::new(
            r#"[
                {"event_type": 1, "timestamp": "2024-01-15T14:00:00Z", "data": {"url": "/cart"}},
                {"event_type": 9, "timestamp": "2024-01-15T14:00:00.100Z", "data": {"url": "/cart", "selector": "button.buy"}},
                {"event_type": 9, "timestamp": "2024-01-15T14:00:00.200Z", "data": {"url": "/cart", "selector": "button.buy"}},
                {"event_type": 9, "timestamp": "2024-01-15T14:00:00.300Z", "data": {"url": "/cart", "selector": "button.buy"}}
            ]"#,
        )
        .unwrap()
    }

    unsafe fn take_json(ptr: *mut c_char) -> Value {
        assert!(!ptr.is_null());
        let value = serde_json::from_str(CStr::from_ptr(ptr).to_str().unwrap()).unwrap();
        lens_free_string(ptr);
        value
    }

    #[test]
    fn test_ffi_analyze_session() {
        let events = sample_events();
        let meta = CString::new(r#"{"id": "s-1", "country": "DE"}"#).unwrap();

        unsafe {
            let value = take_json(lens_analyze_session(events.as_ptr(), meta.as_ptr()));
            assert_eq!(value["insights"][0]["severity"], "high");
            assert!(value["summary"]
                .as_str()
                .unwrap()
                .starts_with("This visitor from DE"));

            let value = take_json(lens_analyze_session(events.as_ptr(), ptr::null()));
            assert!(value["score"]["frustration"].as_u64().unwrap() >= 30);
        }
    }

    #[test]
    fn test_ffi_analyzer_lifecycle() {
        let patterns = CString::new(r#"{"conversion_page": [{"name": "cart", "pattern": "cart"}]}"#).unwrap();
        let events = sample_events();

        unsafe {
            let analyzer = lens_analyzer_new(patterns.as_ptr());
            assert!(!analyzer.is_null());

            let value = take_json(lens_analyzer_analyze(analyzer, events.as_ptr(), ptr::null()));
            assert!(value["insights"].is_array());

            lens_analyzer_free(analyzer);
        }
    }

    #[test]
    fn test_ffi_invalid_patterns() {
        let patterns = CString::new(r#"{"cta": [{"name": "broken", "pattern": "("}]}"#).unwrap();
        unsafe {
            let analyzer = lens_analyzer_new(patterns.as_ptr());
            assert!(analyzer.is_null());
            let error = CStr::from_ptr(lens_last_error()).to_str().unwrap();
            assert!(error.contains("broken"));
        }
    }

    #[test]
    fn test_ffi_overview() {
        let sessions = CString::new(r#"[{"session_id": "a", "events": []}]"#).unwrap();
        unsafe {
            let value = take_json(lens_overview(sessions.as_ptr()));
            assert_eq!(value["total_sessions"], 1);
            assert_eq!(value["health_score"], 100);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let invalid = CString::new("not json").unwrap();
        unsafe {
            let result = lens_analyze_session(invalid.as_ptr(), ptr::null());
            assert!(result.is_null());

            let error = lens_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            assert!(lens_analyze_session(ptr::null(), ptr::null()).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = lens_version();
            assert!(!version.is_null());
            assert_eq!(
                CStr::from_ptr(version).to_str().unwrap(),
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    #[test]
    fn test_ffi_page_analysis() {
        let page = CString::new("/cart").unwrap();
        let sessions = CString::new(format!(
            r#"[{{"session_id": "a", "events": {}}}]"#,
            sample_events().to_str().unwrap()
        ))
        .unwrap();

        unsafe {
            let value = take_json(lens_page_analysis(page.as_ptr(), sessions.as_ptr()));
            assert_eq!(value["page"], "/cart");
            assert_eq!(value["views"], 1);
            assert_eq!(value["click_hotspots"][0]["count"], 3);
        }
    }

    #[test]
    fn test_ffi_trends() {
        let sessions = CString::new(
            r#"[{"session_id": "a", "meta": {"started_at": "2024-01-15T14:00:00Z"}, "events": []}]"#,
        )
        .unwrap();
        let today = CString::new("2024-01-15").unwrap();

        unsafe {
            let value = take_json(lens_trends(sessions.as_ptr(), 7, today.as_ptr()));
            assert_eq!(value["days"], 7);
            assert_eq!(value["daily"][6]["date"], "2024-01-15");
            assert_eq!(value["daily"][6]["sessions"], 1);

            let bad_day = CString::new("yesterday").unwrap();
            assert!(lens_trends(sessions.as_ptr(), 7, bad_day.as_ptr()).is_null());
            let error = CStr::from_ptr(lens_last_error()).to_str().unwrap();
            assert!(error.contains("yesterday"));
        }
    }

    #[test]
    fn test_interior_nul_sets_last_error() {
        clear_last_error();
        assert!(string_to_cstr("{\"a\":\"x\0y\"}").is_null());
        unsafe {
            let error = lens_last_error();
            assert!(!error.is_null());
            assert!(CStr::from_ptr(error).to_str().unwrap().contains("NUL byte"));
        }
    }
}
