//! Jump resolution: turns an answer's jump into the next page to display.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GraphIntegrityError;
use crate::graph::PageGraph;
use crate::model::{Destination, Jump, Page, PageId, ScopeFamily, UserId};

/// Per-learner state threaded through navigation calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnerContext {
    pub user: UserId,
    /// Zero-based retake of the lesson.
    pub retry: u32,
    /// Managers walk branch tables in canonical order instead of randomly.
    pub is_manager: bool,
    seen: Vec<PageId>,
    #[serde(skip)]
    seen_index: HashSet<PageId>,
}

impl LearnerContext {
    pub fn new(user: UserId, retry: u32) -> Self {
        Self {
            user,
            retry,
            ..Default::default()
        }
    }

    pub fn with_manager(mut self, is_manager: bool) -> Self {
        self.is_manager = is_manager;
        self
    }

    /// Restore the seen-page history of an interrupted attempt.
    pub fn with_seen(mut self, pages: impl IntoIterator<Item = PageId>) -> Self {
        for page in pages {
            self.mark_seen(page);
        }
        self
    }

    pub fn mark_seen(&mut self, page: PageId) {
        if self.seen_index.is_empty() && !self.seen.is_empty() {
            self.seen_index = self.seen.iter().copied().collect();
        }
        if self.seen_index.insert(page) {
            self.seen.push(page);
        }
    }

    pub fn has_seen(&self, page: PageId) -> bool {
        if self.seen_index.is_empty() {
            self.seen.contains(&page)
        } else {
            self.seen_index.contains(&page)
        }
    }

    /// Seen pages in first-seen order.
    pub fn seen(&self) -> &[PageId] {
        &self.seen
    }
}

/// A branch or cluster scope around a page.
struct Scope<'g> {
    start: &'g Page,
    members: Vec<&'g Page>,
    exit: Destination,
}

pub struct Navigator<'g> {
    graph: &'g PageGraph,
}

impl<'g> Navigator<'g> {
    pub fn new(graph: &'g PageGraph) -> Self {
        Self { graph }
    }

    /// Resolve `jump` taken from page `current` and record the displayed page
    /// as seen.
    pub fn resolve_jump<R: Rng + ?Sized>(
        &self,
        jump: Jump,
        current: PageId,
        ctx: &mut LearnerContext,
        rng: &mut R,
    ) -> Result<Destination, GraphIntegrityError> {
        let destination = self.resolve(jump, current, ctx, rng)?;
        tracing::debug!(%current, %jump, %destination, user = %ctx.user, "resolved jump");
        if let Destination::Page(id) = destination {
            ctx.mark_seen(id);
        }
        Ok(destination)
    }

    fn resolve<R: Rng + ?Sized>(
        &self,
        jump: Jump,
        current: PageId,
        ctx: &LearnerContext,
        rng: &mut R,
    ) -> Result<Destination, GraphIntegrityError> {
        let page = self.graph.page(current)?;
        match jump {
            Jump::UnseenPageInBranch => match self.branch_scope(page) {
                Some(scope) => Ok(self.pick_unseen(scope, ctx, rng)),
                None => self.fixed(Jump::NextPage, page),
            },
            Jump::RandomPageInBranch => {
                let scope = match (self.branch_scope(page), self.cluster_scope(page)) {
                    (Some(branch), Some(cluster)) => {
                        if self.position(branch.start) > self.position(cluster.start) {
                            Some(branch)
                        } else {
                            Some(cluster)
                        }
                    }
                    (branch, cluster) => branch.or(cluster),
                };
                match scope {
                    Some(scope) => Ok(self.pick_unseen(scope, ctx, rng)),
                    None => self.fixed(Jump::NextPage, page),
                }
            }
            Jump::RandomBranch => self.random_branch(page, ctx, rng),
            Jump::ClusterJump => self.cluster_jump(page, ctx, rng),
            fixed => self.fixed(fixed, page),
        }
    }

    /// Resolve a jump that depends only on the page chain.
    fn fixed(&self, jump: Jump, page: &Page) -> Result<Destination, GraphIntegrityError> {
        match jump {
            Jump::Page(target) => {
                if self.graph.contains(target) {
                    Ok(Destination::Page(target))
                } else {
                    Err(GraphIntegrityError::DanglingJump {
                        page: page.id,
                        target,
                    })
                }
            }
            Jump::ThisPage => Ok(Destination::Page(page.id)),
            Jump::NextPage => Ok(page.next.map_or(Destination::EndOfLesson, Destination::Page)),
            Jump::PreviousPage => Ok(Destination::Page(page.prev.unwrap_or(page.id))),
            Jump::EndOfLesson => Ok(Destination::EndOfLesson),
            // Callers route dynamic jumps through `resolve`; treat a stray one
            // as a plain continue.
            Jump::UnseenPageInBranch
            | Jump::RandomPageInBranch
            | Jump::RandomBranch
            | Jump::ClusterJump => self.fixed(Jump::NextPage, page),
        }
    }

    fn position(&self, page: &Page) -> usize {
        self.graph.position(page.id).unwrap_or(0)
    }

    /// The arm of a branch table that contains `page`: the pages between the
    /// nearest preceding branch table or end-of-branch and the next one.
    ///
    /// Pages after an end-of-branch form an arm only when the branch table
    /// jumps to the first of them; otherwise the branch is closed.
    fn branch_scope(&self, page: &'g Page) -> Option<Scope<'g>> {
        let starts = ScopeFamily::Branch.starts();
        let boundaries = ScopeFamily::Branch.boundaries();

        // An end-of-branch page belongs to the arm it closes.
        let caps = page.kind.capabilities();
        let anchor = if caps.is_scope_end && caps.scope == Some(ScopeFamily::Branch) {
            self.graph.prev_of(page.id)?
        } else {
            page
        };
        let start = self.graph.enclosing(anchor.id, &boundaries, &[])?;
        let members = self.graph.sub_pages_of(start.id, &boundaries);
        if start.kind.capabilities().is_scope_end {
            let table = self.graph.enclosing(start.id, &starts, &[])?;
            let first = members.first()?;
            if !table.answers.iter().any(|a| a.jump == Jump::Page(first.id)) {
                return None;
            }
        }

        let exit = self
            .graph
            .first_after(start.id, &boundaries)
            .map_or(Destination::EndOfLesson, |p| Destination::Page(p.id));
        Some(Scope {
            start,
            members,
            exit,
        })
    }

    fn cluster_scope(&self, page: &'g Page) -> Option<Scope<'g>> {
        let ends = ScopeFamily::Cluster.ends();
        let start = self
            .graph
            .enclosing(page.id, &ScopeFamily::Cluster.starts(), &ends)?;
        let members = self.graph.sub_pages_of(start.id, &ends);
        let exit = self
            .graph
            .first_after(start.id, &ends)
            .map_or(Destination::EndOfLesson, |p| Destination::Page(p.id));
        Some(Scope {
            start,
            members,
            exit,
        })
    }

    /// Uniformly pick an unseen question page of the scope, or leave the
    /// scope once every candidate has been seen.
    fn pick_unseen<R: Rng + ?Sized>(
        &self,
        scope: Scope<'g>,
        ctx: &LearnerContext,
        rng: &mut R,
    ) -> Destination {
        let unseen: Vec<PageId> = scope
            .members
            .iter()
            .filter(|p| is_candidate(p, ctx))
            .map(|p| p.id)
            .collect();
        match unseen.choose(rng) {
            Some(&id) => Destination::Page(id),
            None => {
                tracing::debug!(scope = %scope.start.id, "scope exhausted, leaving");
                scope.exit
            }
        }
    }

    fn random_branch<R: Rng + ?Sized>(
        &self,
        page: &Page,
        ctx: &LearnerContext,
        rng: &mut R,
    ) -> Result<Destination, GraphIntegrityError> {
        let table = self
            .graph
            .enclosing(page.id, &ScopeFamily::Branch.starts(), &[])
            .ok_or(GraphIntegrityError::NoBranchArms(page.id))?;

        if ctx.is_manager {
            return self.fixed(Jump::NextPage, table);
        }

        let mut arms = Vec::with_capacity(table.answers.len());
        for answer in &table.answers {
            if answer.jump.is_dynamic() {
                continue;
            }
            let arm = self.fixed(answer.jump, table)?;
            if !arms.contains(&arm) {
                arms.push(arm);
            }
        }
        if arms.is_empty() {
            return Err(GraphIntegrityError::NoBranchArms(table.id));
        }

        let unseen: Vec<Destination> = arms
            .iter()
            .copied()
            .filter(|arm| arm.page().map_or(true, |id| !ctx.has_seen(id)))
            .collect();
        let pool = if unseen.is_empty() { &arms } else { &unseen };
        pool.choose(rng)
            .copied()
            .ok_or(GraphIntegrityError::NoBranchArms(table.id))
    }

    fn cluster_jump<R: Rng + ?Sized>(
        &self,
        page: &'g Page,
        ctx: &LearnerContext,
        rng: &mut R,
    ) -> Result<Destination, GraphIntegrityError> {
        let Some(scope) = self.cluster_scope(page) else {
            return self.fixed(Jump::NextPage, page);
        };

        let unseen: Vec<PageId> = scope
            .members
            .iter()
            .filter(|p| is_candidate(p, ctx))
            .map(|p| p.id)
            .collect();
        if let Some(&id) = unseen.choose(rng) {
            return Ok(Destination::Page(id));
        }

        // Every member seen: leave through the end-of-cluster page.
        let Destination::Page(end_id) = scope.exit else {
            return Ok(Destination::EndOfLesson);
        };
        let end = self.graph.page(end_id)?;
        match end.answers.first().map(|a| a.jump) {
            None | Some(Jump::ClusterJump) => self.fixed(Jump::NextPage, end),
            Some(jump) => self.resolve(jump, end.id, ctx, rng),
        }
    }
}

/// Random jumps only ever land on unseen non-structural pages.
fn is_candidate(page: &Page, ctx: &LearnerContext) -> bool {
    !page.kind.capabilities().is_marker && !ctx.has_seen(page.id)
}
