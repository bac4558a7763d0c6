pub mod ids;
pub mod logging;
pub mod media;
#[cfg(test)]
pub mod test_utils;
pub mod url;
