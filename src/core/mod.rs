// Core modules: host buffer layouts, list codecs, and error modeling.
pub mod criteria;
pub mod error;
pub mod fetch;
pub mod format;
pub mod layout;
pub mod list_info;
pub mod receive_format;
pub mod record;
pub mod token;
