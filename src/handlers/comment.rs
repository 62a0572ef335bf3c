//! Threaded comments shared by blogs and documents

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::{blog_comment, document_comment, user};
use crate::error::{AppError, AppResult};

pub const EMPTY_COMMENT: &str = "Comment cannot be empty.";

/// A comment row that may reply to another
pub trait ThreadedComment {
    fn comment_id(&self) -> i32;
    fn parent_id(&self) -> Option<i32>;
}

impl ThreadedComment for blog_comment::Model {
    fn comment_id(&self) -> i32 {
        self.id
    }

    fn parent_id(&self) -> Option<i32> {
        self.parent_comment_id
    }
}

impl ThreadedComment for document_comment::Model {
    fn comment_id(&self) -> i32 {
        self.id
    }

    fn parent_id(&self) -> Option<i32> {
        self.parent_comment_id
    }
}

/// `root` and every reply below it
pub fn collect_thread<C: ThreadedComment>(comments: &[C], root: i32) -> Vec<i32> {
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for c in comments {
        if let Some(parent) = c.parent_id() {
            children.entry(parent).or_default().push(c.comment_id());
        }
    }

    let mut seen = HashSet::from([root]);
    let mut order = vec![root];
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for child in children.get(&id).into_iter().flatten() {
            if seen.insert(*child) {
                order.push(*child);
                queue.push_back(*child);
            }
        }
    }
    order
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i32,
    pub user_id: i32,
    pub author_name: String,
    pub author_image: Option<String>,
    pub parent_comment_id: Option<i32>,
    pub content: String,
    pub created_at: i64,
}

impl CommentView {
    pub fn new(
        id: i32,
        parent_comment_id: Option<i32>,
        content: String,
        created_at: i64,
        author_id: i32,
        authors: &HashMap<i32, user::Model>,
    ) -> Self {
        let author = authors.get(&author_id);
        Self {
            id,
            user_id: author_id,
            author_name: author.map(|u| u.name.clone()).unwrap_or_default(),
            author_image: author.and_then(|u| u.image.clone()),
            parent_comment_id,
            content,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<CommentNode>,
}

/// Arrange comments as a reply tree, siblings oldest first. Replies to a
/// missing parent are shown at the top level.
pub fn build_tree(mut comments: Vec<CommentView>) -> Vec<CommentNode> {
    comments.sort_by_key(|c| (c.created_at, c.id));
    let ids: HashSet<i32> = comments.iter().map(|c| c.id).collect();

    let mut children: HashMap<Option<i32>, Vec<CommentView>> = HashMap::new();
    for c in comments {
        let parent = c.parent_comment_id.filter(|p| *p != c.id && ids.contains(p));
        children.entry(parent).or_default().push(c);
    }

    attach(None, &mut children)
}

fn attach(
    parent: Option<i32>,
    children: &mut HashMap<Option<i32>, Vec<CommentView>>,
) -> Vec<CommentNode> {
    children
        .remove(&parent)
        .unwrap_or_default()
        .into_iter()
        .map(|comment| {
            let replies = attach(Some(comment.id), children);
            CommentNode { comment, replies }
        })
        .collect()
}

/// Trimmed comment text, rejecting blanks
pub fn validate_content(content: &str) -> AppResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::invalid(EMPTY_COMMENT));
    }
    Ok(content.to_string())
}
