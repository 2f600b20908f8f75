//! Functions and filters available inside templates
//!
//! - `isset(map, key)`: whether `key` is present and non-null in `map`
//! - `genPass(len)`: random alphanumeric password
//! - `isEnd(index, len)`: whether `index` is the last position of a `len` sequence
//! - `json`: render a value as a JSON literal (strings come out quoted)

use minijinja::{Error, ErrorKind, Value};
use rand::Rng;

/// Characters used for generated passwords
const PASSWORD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a random password of `len` characters from `[a-zA-Z0-9]`
pub fn generate_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// `isset(map, key)`
pub fn isset(map: Value, key: &str) -> bool {
    if map.is_undefined() || map.is_none() {
        return false;
    }
    match map.get_item(&Value::from(key)) {
        Ok(v) => !v.is_undefined() && !v.is_none(),
        Err(_) => false,
    }
}

/// `genPass(len)`
pub fn gen_pass(len: u32) -> String {
    generate_password(len as usize)
}

/// `isEnd(index, len)`
pub fn is_end(index: i64, len: i64) -> bool {
    index == len - 1
}

/// `value | json`
///
/// Undefined values render as `null` so templates stay decodable when
/// rendered without a payload.
pub fn json(value: Value) -> Result<String, Error> {
    if value.is_undefined() {
        return Ok("null".to_string());
    }
    serde_json::to_string(&value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("value is not representable as JSON: {}", e),
        )
    })
}
