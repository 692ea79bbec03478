//! 命名约定工具
//!
//! 路由名、动作名与方法名之间的固定转换规则都集中在这里。

pub mod naming {
    /// 首字母大写
    ///
    /// ```
    /// use waypoint_core::utils::naming::first_upper;
    ///
    /// assert_eq!(first_upper("default"), "Default");
    /// assert_eq!(first_upper(""), "");
    /// ```
    pub fn first_upper(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => first.to_uppercase().chain(chars).collect(),
        }
    }

    /// 首字母小写
    pub fn first_lower(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => first.to_lowercase().chain(chars).collect(),
        }
    }

    /// PascalCase → kebab-case，每个大写字母都开启新的片段
    ///
    /// ```
    /// use waypoint_core::utils::naming::to_kebab_case;
    ///
    /// assert_eq!(to_kebab_case("UserProfile"), "user-profile");
    /// assert_eq!(to_kebab_case("HTTPStatus"), "h-t-t-p-status");
    /// ```
    pub fn to_kebab_case(s: &str) -> String {
        let mut result = String::with_capacity(s.len() + s.len() / 2);
        for ch in first_lower(s).chars() {
            if ch.is_uppercase() {
                result.push('-');
                result.extend(ch.to_lowercase());
            } else {
                result.push(ch);
            }
        }
        result
    }

    /// kebab-case → camelCase，只有 `-` 后紧跟的小写字母会被提升
    ///
    /// ```
    /// use waypoint_core::utils::naming::kebab_to_camel_case;
    ///
    /// assert_eq!(kebab_to_camel_case("create-user"), "createUser");
    /// assert_eq!(kebab_to_camel_case("default"), "default");
    /// ```
    pub fn kebab_to_camel_case(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        let mut chars = s.chars().peekable();
        while let Some(ch) = chars.next() {
            match (ch, chars.peek()) {
                ('-', Some(next)) if next.is_ascii_lowercase() => {
                    result.extend(next.to_uppercase());
                    chars.next();
                }
                _ => result.push(ch),
            }
        }
        result
    }

    /// snake_case → camelCase，用于把 Rust 方法名映射到约定的动作方法名
    ///
    /// ```
    /// use waypoint_core::utils::naming::snake_to_camel_case;
    ///
    /// assert_eq!(snake_to_camel_case("post_create_user"), "postCreateUser");
    /// assert_eq!(snake_to_camel_case("action_default"), "actionDefault");
    /// ```
    pub fn snake_to_camel_case(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        let mut upper_next = false;
        for ch in s.trim_start_matches('_').chars() {
            if ch == '_' {
                upper_next = true;
            } else if upper_next {
                result.extend(ch.to_uppercase());
                upper_next = false;
            } else {
                result.push(ch);
            }
        }
        result
    }

    /// 端点类型名 → 路由名：去掉 `Endpoint` 后缀和模块路径，再转 kebab-case
    ///
    /// ```
    /// use waypoint_core::utils::naming::route_name_for;
    ///
    /// assert_eq!(route_name_for("app::api::UserProfileEndpoint"), "user-profile");
    /// assert_eq!(route_name_for("PingEndpoint"), "ping");
    /// ```
    pub fn route_name_for(type_name: &str) -> String {
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        let stem = match short.strip_suffix("Endpoint") {
            Some(stem) if !stem.is_empty() => stem,
            _ => short,
        };
        to_kebab_case(stem)
    }
}
