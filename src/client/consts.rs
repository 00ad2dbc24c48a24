pub const LIVE_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const API_KEY_PARAM: &str = "key";
pub const DEFAULT_CAPACITY: usize = 1024;
