pub struct Icons;

impl Icons {
    pub const BOLT: &str = "⚡";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const FILE: &str = "📄";
    pub const WRITE: &str = "📝";
    pub const SKIP: &str = "⏭️";
}
