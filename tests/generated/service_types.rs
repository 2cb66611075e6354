// @generated by ngcs-gen from service.ngcs. Do not edit.

/// Exit code reported for a signal-terminated process.
pub const EXIT_SIGNALED: i32 = 128;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Exit {
    pub code: i32,
    pub signal: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Service {
    pub name: String,
    pub label: Vec<u8>,
    pub label_len: usize,
    pub env: Vec<u8>,
    pub env_len: usize,
    pub started: i64,
    pub exit: Exit,
    pub parent: Option<Box<Exit>>,
    pub cache: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Marker {}
