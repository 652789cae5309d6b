//! Output services

pub mod encoding;

pub use encoding::{
    encode_base64, render_failure, render_success, to_data_url, JsonResponse, ResponseStatus,
    FAILURE_SENTINEL,
};
