//! 示例端点：一个内存中的文章库

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use parking_lot::RwLock;
use serde::Deserialize;
use waypoint_api::prelude::*;
use waypoint_api::value::Fields;

#[derive(Debug, Clone)]
struct Article {
    id: u64,
    title: String,
    status: String,
    author_password: String,
}

impl Article {
    fn to_record(&self) -> Record {
        Record::new("Article")
            .with_field("id", self.id)
            .with_field("title", self.title.clone())
            .with_field("status", self.status.clone())
            .with_field("password", self.author_password.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// 文章管理：浏览公开，修改需要 `editor` 角色
#[derive(Endpoint)]
#[endpoint(public, on_save = "touch")]
pub struct ArticleEndpoint {
    articles: RwLock<Vec<Article>>,
    next_id: AtomicU64,
    saves: AtomicU64,
}

impl Default for ArticleEndpoint {
    fn default() -> Self {
        let seed = ["Hello world", "Release notes", "Roadmap"]
            .iter()
            .enumerate()
            .map(|(i, title)| Article {
                id: i as u64 + 1,
                title: title.to_string(),
                status: if i == 2 { "draft" } else { "published" }.to_string(),
                author_password: "hunter2".to_string(),
            })
            .collect::<Vec<_>>();

        Self {
            next_id: AtomicU64::new(seed.len() as u64 + 1),
            articles: RwLock::new(seed),
            saves: AtomicU64::new(0),
        }
    }
}

impl ArticleEndpoint {
    fn touch(&self) {
        let saves = self.saves.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(saves, "Article endpoint state saved");
    }
}

#[actions]
impl ArticleEndpoint {
    /// `GET api/v1/article?page=1&limit=2`
    pub fn action_default(
        &self,
        ctx: &mut ActionContext,
        #[default(1)] page: i64,
        #[default(20)] limit: u64,
        status: Option<String>,
    ) -> ActionResult<()> {
        let articles = self.articles.read();
        let filtered: Vec<&Article> = articles
            .iter()
            .filter(|a| status.as_deref().map_or(true, |s| a.status == s))
            .collect();

        let paginator = Paginator::new(page, limit.max(1), filtered.len() as u64);
        let offset = ((paginator.page() - paginator.first_page()) as u64 * paginator.items_per_page()) as usize;
        let items: Vec<Value> = filtered
            .iter()
            .skip(offset)
            .take(paginator.items_per_page() as usize)
            .map(|a| Value::from(a.to_record()))
            .collect();

        let mut counts: Vec<StatusCount> = Vec::new();
        for article in articles.iter() {
            match counts.iter_mut().find(|c| c.key == article.status) {
                Some(count) => count.count += 1,
                None => counts.push(StatusCount::new(article.status.clone(), 1)),
            }
        }

        let extra: Fields = vec![(
            "statusCount".to_string(),
            Value::list(counts),
        )];
        ctx.send_items(Value::List(items), Some(paginator), extra)
    }

    /// `GET api/v1/article/detail?id=1`
    pub fn action_detail(&self, ctx: &mut ActionContext, id: u64) -> ActionResult<Value> {
        let article = self.articles.read().iter().find(|a| a.id == id).cloned();
        match article {
            Some(article) => Ok(Value::from(article.to_record())),
            None => ctx.send_status(StatusResponse::not_found(format!("Article {} does not exist", id))),
        }
    }

    /// `GET api/v1/article/select-options`
    pub fn action_select_options(&self) -> Value {
        let articles = self.articles.read();
        format_select_options(articles.iter().map(|a| (a.id, a.title.clone())))
    }

    #[role("editor")]
    pub fn post_create(&self, ctx: &mut ActionContext, draft: ArticleDraft) -> ActionResult<()> {
        if draft.title.trim().is_empty() {
            return ctx.send_error_with_code("Title can not be empty", 422);
        }

        let article = Article {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            title: draft.title,
            status: draft.status.unwrap_or_else(|| "draft".to_string()),
            author_password: String::new(),
        };
        let id = article.id;
        self.articles.write().push(article);

        ctx.flash_message(format!("Article {} created", id), FlashKind::Success);
        ctx.send_ok(Value::map([
            ("id", Value::from(id)),
            ("createdAt", Value::from(Local::now())),
        ]))
    }

    #[role("editor")]
    pub fn delete_default(&self, ctx: &mut ActionContext, id: u64) -> ActionResult<()> {
        let mut articles = self.articles.write();
        let before = articles.len();
        articles.retain(|a| a.id != id);
        if articles.len() == before {
            return Err(Halt::user(format!("Article {} does not exist", id)));
        }
        ctx.flash_message(format!("Article {} removed", id), FlashKind::Info);
        Ok(())
    }

    /// `GET api/v1/article/preview?id=1` 跳转到前台页面
    pub fn action_preview(&self, ctx: &mut ActionContext, id: u64) -> ActionResult<()> {
        ctx.redirect_url(format!("https://blog.example.com/articles/{}", id))
    }
}
