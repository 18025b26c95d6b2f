pub mod backup_config;
pub mod dispatch;
pub mod dump;
pub mod file_ext;
pub mod janitor;
pub mod plan;
pub mod platform;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod target;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
