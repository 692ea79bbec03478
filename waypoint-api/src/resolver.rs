//! 动作方法解析
//!
//! `(HTTP 方法, 动作名)` → 候选方法名，按顺序取第一个存在的：
//! - `GET`：`action` + 首字母大写的动作名
//! - 其他：小写方法名 + 首字母大写的动作名；`PUT` 额外尝试 `update…`，`POST` 额外尝试 `create…`

use waypoint_core::utils::naming::first_upper;

use crate::endpoint::{ActionDescriptor, EndpointDescriptor};

/// 按优先级排列的候选方法名
pub fn candidate_methods(verb: &str, action: &str) -> Vec<String> {
    let action = first_upper(action);
    let verb = verb.to_ascii_uppercase();

    if verb == "GET" {
        return vec![format!("action{}", action)];
    }

    let mut candidates = vec![format!("{}{}", verb.to_ascii_lowercase(), action)];
    match verb.as_str() {
        "PUT" => candidates.push(format!("update{}", action)),
        "POST" => candidates.push(format!("create{}", action)),
        _ => {}
    }
    candidates
}

/// 在端点中找到动作方法
pub fn resolve_method<'a>(
    descriptor: &'a EndpointDescriptor,
    verb: &str,
    action: &str,
) -> Option<&'a ActionDescriptor> {
    candidate_methods(verb, action)
        .iter()
        .find_map(|candidate| descriptor.action(candidate))
}
