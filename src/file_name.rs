// Collision-resistant, sortable names for generated images.

use crate::timestamp::date_id;
use chrono::{DateTime, Local};
use uuid::Uuid;

const UNIQUE_TIME_WIDTH: usize = 6;
const UNIQUE_RANDOM_WIDTH: usize = 6;
const MAX_EXTENSION_LEN: usize = 8;
const FALLBACK_EXTENSION: &str = "bin";

#[derive(Debug, Clone)]
pub struct FileNameGenerator {
    prefix: String,
}

impl FileNameGenerator {
    /// `prefix` must already be a safe path component (validated at config load).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `<prefix>-<dateId>-<uniqueId>[-<index>].<ext>`
    pub fn make_file_name(&self, index: Option<usize>, output_format: &str) -> String {
        let now = Local::now();
        let random = Uuid::new_v4().as_u128();
        self.make_file_name_at(&now, random, index, output_format)
    }

    fn make_file_name_at(
        &self,
        now: &DateTime<Local>,
        random: u128,
        index: Option<usize>,
        output_format: &str,
    ) -> String {
        let unique = unique_id(now.timestamp_millis(), random);
        let extension = sanitize_extension(output_format);
        match index {
            Some(index) => format!(
                "{}-{}-{}-{}.{}",
                self.prefix,
                date_id(now),
                unique,
                index,
                extension
            ),
            None => format!("{}-{}-{}.{}", self.prefix, date_id(now), unique, extension),
        }
    }
}

/// Leading base-36 digits of the millisecond clock followed by a zero-padded
/// base-36 random suffix; always `UNIQUE_TIME_WIDTH + UNIQUE_RANDOM_WIDTH` chars.
pub fn unique_id(now_millis: i64, random: u128) -> String {
    let mut time_part = to_base36(now_millis.max(0) as u128);
    time_part.truncate(UNIQUE_TIME_WIDTH);
    let time_part = format!("{:0>width$}", time_part, width = UNIQUE_TIME_WIDTH);

    let random_part = to_base36(random % 36u128.pow(UNIQUE_RANDOM_WIDTH as u32));
    let random_part = format!("{:0>width$}", random_part, width = UNIQUE_RANDOM_WIDTH);

    time_part + &random_part
}

/// Reduces a caller-supplied output format to a safe lowercase file extension.
pub fn sanitize_extension(output_format: &str) -> String {
    let extension: String = output_format
        .trim()
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();

    if extension.is_empty() {
        FALLBACK_EXTENSION.to_string()
    } else {
        extension
    }
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
