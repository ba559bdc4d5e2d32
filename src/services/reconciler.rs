//! Entity reconciliation: remote snapshots in, local rows out.
//!
//! Every entity kind goes through the same upsert path:
//!
//! 1. look the remote identity up in the run's identity cache,
//! 2. on a miss, look it up in the store (labels and milestones fall back to
//!    their per-repository alternate key),
//! 3. otherwise insert a new row,
//! 4. copy the mutable fields from the snapshot,
//! 5. put the row back in the cache.
//!
//! So within one run each remote identity maps to exactly one row, and
//! reconciling an unchanged snapshot writes nothing.
//!
//! All writes go through the reconciler's [`UnitOfWork`]; nothing is durable
//! until [`Reconciler::flush`].

use crate::db::pool::DbPool;
use crate::db::unit_of_work::{UnitOfWork, WriteGate};
use crate::error::AppError;
use crate::models::actor::{self, Actor, ActorFields, ActorKind};
use crate::models::issue::{self, ActorCollection, Issue, IssueKind, PullRequestDetails, Reactions};
use crate::models::issue_link;
use crate::models::label::{self, Label};
use crate::models::milestone::{self, Milestone};
use crate::models::repository::{self, Repository};
use crate::services::github_client::{
    GitHubApi, GitHubIssue, GitHubLabel, GitHubMilestone, GitHubPullRequest, GitHubRepository,
    GitHubTeam, GitHubUser,
};
use crate::services::link_scanner;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Reconciler behavior switches.
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Fetch `/pulls/{n}` for each pull request to copy branch, merge and
    /// review request data.
    pub fetch_pull_details: bool,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            fetch_pull_details: true,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    pub issues: u64,
    pub pull_requests: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub stubs_created: u64,
    pub assignees_added: u64,
    pub assignees_removed: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub review_requests_added: u64,
    pub review_requests_removed: u64,
    pub links_written: u64,
    pub links_resolved: u64,
}

/// Result of comparing a stored collection with the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDiff<K> {
    /// Join row ids to delete.
    pub to_remove: Vec<i64>,
    /// Keys to insert, in snapshot order.
    pub to_add: Vec<K>,
    /// Members present on both sides.
    pub unchanged: usize,
}

impl<K> CollectionDiff<K> {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Diff a stored collection, given as `(join row id, key)` pairs, against the
/// desired set of keys. Members on both sides are left alone; duplicate
/// stored members beyond the first are removed.
pub fn diff_collection<K>(existing: &[(i64, K)], desired: &[K]) -> CollectionDiff<K>
where
    K: Eq + Hash + Clone,
{
    let wanted: HashSet<&K> = desired.iter().collect();
    let mut kept: HashSet<&K> = HashSet::new();
    let mut to_remove = Vec::new();

    for (join_id, key) in existing {
        if wanted.contains(key) && kept.insert(key) {
            continue;
        }
        to_remove.push(*join_id);
    }

    let mut seen: HashSet<&K> = HashSet::new();
    let to_add = desired
        .iter()
        .filter(|key| !kept.contains(*key) && seen.insert(*key))
        .cloned()
        .collect();

    CollectionDiff {
        to_remove,
        to_add,
        unchanged: kept.len(),
    }
}

fn name_key(owner: &str, name: &str) -> (String, String) {
    (owner.to_lowercase(), name.to_lowercase())
}

/// Per-run identity caches. One per reconciler, never shared.
#[derive(Default)]
struct IdentityCache {
    accounts: HashMap<i64, Actor>,
    teams: HashMap<(String, String), Actor>,
    repositories: HashMap<i64, Repository>,
    repositories_by_name: HashMap<(String, String), Repository>,
    labels: HashMap<i64, Label>,
    milestones: HashMap<i64, Milestone>,
    issues: HashMap<i64, Issue>,
}

impl IdentityCache {
    fn put_repository(&mut self, repository: &Repository) {
        if let Some(github_id) = repository.github_id {
            self.repositories.insert(github_id, repository.clone());
        }
        self.repositories_by_name.insert(
            name_key(&repository.owner, &repository.name),
            repository.clone(),
        );
    }
}

/// Copy account fields onto a user, bot or organization row.
pub fn apply_account(actor: &mut Actor, user: &GitHubUser) -> Result<(), AppError> {
    let incoming = ActorKind::from_remote_type(user.account_type.as_deref());
    if actor.kind_enum().is_team() {
        return Err(AppError::ActorKindMismatch {
            name: actor.name.clone(),
            stored: actor.kind.clone(),
            incoming: incoming.to_string(),
        });
    }
    if actor.kind_enum() != incoming {
        log::debug!(
            "Actor {} is stored as {} and stays one (remote reports {})",
            user.login,
            actor.kind,
            incoming
        );
    }

    actor.github_id = user.id;
    actor.node_id = user.node_id.clone();
    actor.name = user.login.clone();
    actor.avatar_url = user.avatar_url.clone();
    Ok(())
}

/// Copy team fields onto a team row.
pub fn apply_team(actor: &mut Actor, team: &GitHubTeam, organization: &str) -> Result<(), AppError> {
    if !actor.kind_enum().is_team() {
        return Err(AppError::ActorKindMismatch {
            name: actor.name.clone(),
            stored: actor.kind.clone(),
            incoming: ActorKind::Team.to_string(),
        });
    }

    actor.github_id = team.id;
    actor.node_id = team.node_id.clone();
    actor.name = team.name.clone();
    actor.organization = Some(organization.to_string());
    Ok(())
}

fn apply_issue(
    issue: &mut Issue,
    repository_id: i64,
    remote: &GitHubIssue,
    author_id: i64,
    milestone_id: Option<i64>,
    details: Option<&GitHubPullRequest>,
) {
    issue.repository_id = repository_id;
    issue.github_id = remote.id;
    issue.node_id = remote.node_id.clone();
    issue.number = remote.number;
    issue.title = remote.title.clone();
    issue.body = remote.body.clone().unwrap_or_default();
    issue.state = remote.state.clone();
    issue.locked = remote.locked;
    issue.comment_count = remote.comments;
    issue.html_url = remote.html_url.clone();
    issue.author_id = author_id;
    issue.milestone_id = milestone_id;
    issue.created_at = remote.created_at.timestamp();
    issue.updated_at = remote.updated_at.timestamp();
    issue.closed_at = remote.closed_at.map(|t| t.timestamp());

    if let Some(r) = &remote.reactions {
        issue.reactions = Reactions {
            total: r.total_count,
            plus1: r.plus1,
            minus1: r.minus1,
            laugh: r.laugh,
            hooray: r.hooray,
            confused: r.confused,
            heart: r.heart,
            rocket: r.rocket,
            eyes: r.eyes,
        };
    }

    if let Some(pr) = &remote.pull_request {
        issue.pull_request.merged_at = pr.merged_at.map(|t| t.timestamp());
    }
    if let Some(details) = details {
        issue.pull_request = PullRequestDetails {
            merged_at: details.merged_at.map(|t| t.timestamp()),
            merged: details.merged,
            merge_commit_sha: details.merge_commit_sha.clone(),
            draft: details.draft,
            head_ref: Some(details.head.ref_name.clone()),
            head_sha: Some(details.head.sha.clone()),
            base_ref: Some(details.base.ref_name.clone()),
            base_sha: Some(details.base.sha.clone()),
        };
    }
}

/// Turns remote snapshots into local rows for one sync run.
pub struct Reconciler<'a> {
    api: &'a dyn GitHubApi,
    uow: UnitOfWork,
    cache: IdentityCache,
    options: ReconcilerOptions,
    stats: ReconcileStats,
}

impl<'a> Reconciler<'a> {
    /// Reconcilers sharing `gate` take turns holding a store transaction.
    pub fn new(
        api: &'a dyn GitHubApi,
        pool: DbPool,
        gate: WriteGate,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            api,
            uow: UnitOfWork::new(pool, gate),
            cache: IdentityCache::default(),
            options,
            stats: ReconcileStats::default(),
        }
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Commit pending writes, first pointing pending links at any target
    /// issues that now exist locally.
    pub async fn flush(&mut self) -> Result<(), AppError> {
        if self.uow.is_dirty() {
            let resolved = issue_link::resolve_pending(self.uow.conn().await?).await?;
            if resolved > 0 {
                log::debug!("Resolved {} pending issue links", resolved);
            }
            self.stats.links_resolved += resolved;
        }
        self.uow.flush().await?;
        Ok(())
    }

    /// Discard writes made since the last flush.
    pub async fn discard(&mut self) -> Result<(), AppError> {
        self.uow.rollback().await?;
        // Cached rows may describe writes that were just rolled back
        self.cache = IdentityCache::default();
        Ok(())
    }

    /// Reconcile a user, bot or organization.
    pub async fn sync_actor(&mut self, user: &GitHubUser) -> Result<Actor, AppError> {
        let cached = self.cache.accounts.get(&user.id).cloned();
        let (mut actor, fresh) = match cached {
            Some(actor) => (actor, false),
            None => match actor::find_account(self.uow.conn().await?, user.id).await? {
                Some(actor) => (actor, false),
                None => {
                    let fields = ActorFields {
                        github_id: user.id,
                        node_id: user.node_id.as_deref(),
                        kind: ActorKind::from_remote_type(user.account_type.as_deref()),
                        name: &user.login,
                        avatar_url: user.avatar_url.as_deref(),
                        organization: None,
                    };
                    let actor = actor::insert(self.uow.conn().await?, &fields).await?;
                    self.stats.rows_created += 1;
                    (actor, true)
                }
            },
        };

        let before = actor.clone();
        apply_account(&mut actor, user)?;
        if !fresh && actor != before {
            actor::update(self.uow.conn().await?, &actor).await?;
            self.stats.rows_updated += 1;
        }

        self.cache.accounts.insert(user.id, actor.clone());
        Ok(actor)
    }

    /// Reconcile a team. Teams are keyed by organization and name;
    /// `default_organization` is used when the payload omits the organization.
    pub async fn sync_team(
        &mut self,
        team: &GitHubTeam,
        default_organization: &str,
    ) -> Result<Actor, AppError> {
        let organization = team
            .organization
            .as_ref()
            .map(|o| o.login.as_str())
            .unwrap_or(default_organization);
        let key = name_key(organization, &team.name);

        let cached = self.cache.teams.get(&key).cloned();
        let (mut actor, fresh) = match cached {
            Some(actor) => (actor, false),
            None => match actor::find_team(self.uow.conn().await?, organization, &team.name).await? {
                Some(actor) => (actor, false),
                None => {
                    let fields = ActorFields {
                        github_id: team.id,
                        node_id: team.node_id.as_deref(),
                        kind: ActorKind::Team,
                        name: &team.name,
                        avatar_url: None,
                        organization: Some(organization),
                    };
                    let actor = actor::insert(self.uow.conn().await?, &fields).await?;
                    self.stats.rows_created += 1;
                    (actor, true)
                }
            },
        };

        let before = actor.clone();
        apply_team(&mut actor, team, organization)?;
        if !fresh && actor != before {
            actor::update(self.uow.conn().await?, &actor).await?;
            self.stats.rows_updated += 1;
        }

        self.cache.teams.insert(key, actor.clone());
        Ok(actor)
    }

    /// Reconcile a repository snapshot. A stub with the same name is adopted.
    pub async fn sync_repository(
        &mut self,
        remote: &GitHubRepository,
    ) -> Result<Repository, AppError> {
        let cached = self.cache.repositories.get(&remote.id).cloned();
        let existing = match cached {
            Some(repository) => Some(repository),
            None => match repository::find_by_github_id(self.uow.conn().await?, remote.id).await? {
                Some(repository) => Some(repository),
                None => {
                    repository::find_by_name(self.uow.conn().await?, &remote.owner.login, &remote.name)
                        .await?
                }
            },
        };

        let repository = match existing {
            Some(mut repository) => {
                let before = repository.clone();
                repository.github_id = Some(remote.id);
                repository.node_id = remote.node_id.clone();
                repository.owner = remote.owner.login.clone();
                repository.name = remote.name.clone();
                if repository != before {
                    if before.is_stub() {
                        log::info!("Filling in stub repository {}", repository.full_name());
                    }
                    repository::update(self.uow.conn().await?, &repository).await?;
                    self.stats.rows_updated += 1;
                }
                repository
            }
            None => {
                let repository = repository::insert(
                    self.uow.conn().await?,
                    Some(remote.id),
                    remote.node_id.as_deref(),
                    &remote.owner.login,
                    &remote.name,
                )
                .await?;
                self.stats.rows_created += 1;
                repository
            }
        };

        self.cache.put_repository(&repository);
        Ok(repository)
    }

    /// Resolve a repository by name, fetching it if it is not known locally.
    ///
    /// When the remote reports the repository as missing (or hidden from the
    /// token), a stub row holding just the owner and name is created.
    pub async fn sync_repository_by_name(
        &mut self,
        owner: &str,
        name: &str,
    ) -> Result<Repository, AppError> {
        let key = name_key(owner, name);
        if let Some(repository) = self.cache.repositories_by_name.get(&key) {
            return Ok(repository.clone());
        }

        if let Some(repository) =
            repository::find_by_name(self.uow.conn().await?, owner, name).await?
        {
            self.cache.put_repository(&repository);
            return Ok(repository);
        }

        match self.api.get_repository(owner, name).await {
            Ok(remote) => self.sync_repository(&remote).await,
            Err(e) if e.is_not_found() => {
                log::info!("Repository {}/{} not found remotely, creating stub", owner, name);
                let stub = repository::insert(self.uow.conn().await?, None, None, owner, name).await?;
                self.stats.rows_created += 1;
                self.stats.stubs_created += 1;
                self.cache.put_repository(&stub);
                Ok(stub)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sync_label(
        &mut self,
        repository: &Repository,
        remote: &GitHubLabel,
    ) -> Result<Label, AppError> {
        let cached = self.cache.labels.get(&remote.id).cloned();
        let existing = match cached {
            Some(label) => Some(label),
            None => match label::find_by_github_id(self.uow.conn().await?, remote.id).await? {
                Some(label) => Some(label),
                None => label::find_by_name(self.uow.conn().await?, repository.id, &remote.name).await?,
            },
        };

        let mut desired = existing.clone().unwrap_or(Label {
            id: 0,
            repository_id: repository.id,
            github_id: remote.id,
            node_id: None,
            name: String::new(),
            color: String::new(),
            description: None,
        });
        desired.github_id = remote.id;
        desired.node_id = remote.node_id.clone();
        desired.name = remote.name.clone();
        desired.color = remote.color.clone();
        desired.description = remote.description.clone();

        let label = match existing {
            Some(before) => {
                if desired != before {
                    label::update(self.uow.conn().await?, &desired).await?;
                    self.stats.rows_updated += 1;
                }
                desired
            }
            None => {
                let label = label::insert(self.uow.conn().await?, &desired).await?;
                self.stats.rows_created += 1;
                label
            }
        };

        self.cache.labels.insert(remote.id, label.clone());
        Ok(label)
    }

    pub async fn sync_milestone(
        &mut self,
        repository: &Repository,
        remote: &GitHubMilestone,
    ) -> Result<Milestone, AppError> {
        let cached = self.cache.milestones.get(&remote.id).cloned();
        let existing = match cached {
            Some(milestone) => Some(milestone),
            None => match milestone::find_by_github_id(self.uow.conn().await?, remote.id).await? {
                Some(milestone) => Some(milestone),
                None => {
                    milestone::find_by_number(self.uow.conn().await?, repository.id, remote.number)
                        .await?
                }
            },
        };

        let mut desired = existing.clone().unwrap_or(Milestone {
            id: 0,
            repository_id: repository.id,
            github_id: remote.id,
            node_id: None,
            number: remote.number,
            title: String::new(),
            description: None,
            state: String::new(),
            due_on: None,
        });
        desired.github_id = remote.id;
        desired.node_id = remote.node_id.clone();
        desired.number = remote.number;
        desired.title = remote.title.clone();
        desired.description = remote.description.clone();
        desired.state = remote.state.clone();
        desired.due_on = remote.due_on.map(|t| t.timestamp());

        let milestone = match existing {
            Some(before) => {
                if desired != before {
                    milestone::update(self.uow.conn().await?, &desired).await?;
                    self.stats.rows_updated += 1;
                }
                desired
            }
            None => {
                let milestone = milestone::insert(self.uow.conn().await?, &desired).await?;
                self.stats.rows_created += 1;
                milestone
            }
        };

        self.cache.milestones.insert(remote.id, milestone.clone());
        Ok(milestone)
    }

    /// Reconcile an issue or pull request and all of its collections.
    ///
    /// The variant is fixed when the row is created; a snapshot of the other
    /// variant fails with [`AppError::VariantMismatch`].
    pub async fn sync_issue(
        &mut self,
        repository: &Repository,
        remote: &GitHubIssue,
    ) -> Result<Issue, AppError> {
        let remote_kind = if remote.is_pull_request() {
            IssueKind::PullRequest
        } else {
            IssueKind::Issue
        };

        let cached = self.cache.issues.get(&remote.id).cloned();
        let existing = match cached {
            Some(issue) => Some(issue),
            None => match issue::find_by_github_id(self.uow.conn().await?, remote.id).await? {
                Some(issue) => Some(issue),
                None => {
                    issue::find_by_number(self.uow.conn().await?, repository.id, remote.number)
                        .await?
                }
            },
        };

        if let Some(stored) = &existing {
            if stored.kind_enum() != remote_kind {
                return Err(AppError::VariantMismatch {
                    repository: repository.full_name(),
                    number: remote.number,
                    stored: stored.kind.clone(),
                    remote: remote_kind.to_string(),
                });
            }
        }

        let author = self.sync_actor(&remote.user).await?;
        let milestone_id = match &remote.milestone {
            Some(m) => Some(self.sync_milestone(repository, m).await?.id),
            None => None,
        };

        let details = if remote_kind == IssueKind::PullRequest && self.options.fetch_pull_details {
            Some(
                self.api
                    .get_pull_request(&repository.owner, &repository.name, remote.number)
                    .await?,
            )
        } else {
            None
        };

        let (mut issue, fresh) = match existing {
            Some(issue) => (issue, false),
            None => {
                let placeholder = Issue {
                    id: 0,
                    repository_id: repository.id,
                    github_id: remote.id,
                    node_id: remote.node_id.clone(),
                    number: remote.number,
                    kind: remote_kind.to_string(),
                    title: remote.title.clone(),
                    body: String::new(),
                    state: remote.state.clone(),
                    locked: false,
                    comment_count: 0,
                    html_url: None,
                    author_id: author.id,
                    milestone_id: None,
                    created_at: remote.created_at.timestamp(),
                    updated_at: remote.updated_at.timestamp(),
                    closed_at: None,
                    reactions: Reactions::default(),
                    pull_request: PullRequestDetails::default(),
                };
                let issue = issue::insert(self.uow.conn().await?, &placeholder).await?;
                self.stats.rows_created += 1;
                (issue, true)
            }
        };

        let before = issue.clone();
        apply_issue(
            &mut issue,
            repository.id,
            remote,
            author.id,
            milestone_id,
            details.as_ref(),
        );
        if fresh || issue != before {
            issue::update(self.uow.conn().await?, &issue).await?;
            if !fresh {
                self.stats.rows_updated += 1;
            }
        }
        self.cache.issues.insert(remote.id, issue.clone());

        self.sync_assignees(&issue, &remote.assignees).await?;
        self.sync_issue_labels(repository, &issue, &remote.labels).await?;
        if let Some(details) = &details {
            self.sync_review_requests(repository, &issue, details).await?;
        }
        self.sync_links(repository, &issue, remote.body.as_deref()).await?;

        match remote_kind {
            IssueKind::Issue => self.stats.issues += 1,
            IssueKind::PullRequest => self.stats.pull_requests += 1,
        }
        log::trace!("Reconciled {}#{} ({})", repository.full_name(), issue.number, issue.kind);

        Ok(issue)
    }

    async fn sync_actor_collection(
        &mut self,
        collection: ActorCollection,
        issue_id: i64,
        desired: &[i64],
    ) -> Result<(u64, u64), AppError> {
        let existing: Vec<(i64, i64)> =
            issue::actors_in(self.uow.conn().await?, collection, issue_id)
                .await?
                .into_iter()
                .map(|(join_id, actor)| (join_id, actor.id))
                .collect();

        let diff = diff_collection(&existing, desired);
        for join_id in &diff.to_remove {
            issue::remove_actor(self.uow.conn().await?, collection, *join_id).await?;
        }
        for actor_id in &diff.to_add {
            issue::add_actor(self.uow.conn().await?, collection, issue_id, *actor_id).await?;
        }

        Ok((diff.to_add.len() as u64, diff.to_remove.len() as u64))
    }

    async fn sync_assignees(
        &mut self,
        issue: &Issue,
        assignees: &[GitHubUser],
    ) -> Result<(), AppError> {
        let mut desired = Vec::with_capacity(assignees.len());
        for user in assignees {
            desired.push(self.sync_actor(user).await?.id);
        }

        let (added, removed) = self
            .sync_actor_collection(ActorCollection::Assignees, issue.id, &desired)
            .await?;
        self.stats.assignees_added += added;
        self.stats.assignees_removed += removed;
        Ok(())
    }

    async fn sync_review_requests(
        &mut self,
        repository: &Repository,
        issue: &Issue,
        details: &GitHubPullRequest,
    ) -> Result<(), AppError> {
        let mut desired = Vec::new();
        for user in &details.requested_reviewers {
            desired.push(self.sync_actor(user).await?.id);
        }
        for team in &details.requested_teams {
            desired.push(self.sync_team(team, &repository.owner).await?.id);
        }

        let (added, removed) = self
            .sync_actor_collection(ActorCollection::ReviewRequests, issue.id, &desired)
            .await?;
        self.stats.review_requests_added += added;
        self.stats.review_requests_removed += removed;
        Ok(())
    }

    /// Labels are matched by name, ignoring case.
    async fn sync_issue_labels(
        &mut self,
        repository: &Repository,
        issue: &Issue,
        labels: &[GitHubLabel],
    ) -> Result<(), AppError> {
        let mut label_ids: HashMap<String, i64> = HashMap::new();
        let mut desired = Vec::with_capacity(labels.len());
        for remote in labels {
            let label = self.sync_label(repository, remote).await?;
            let key = label.name.to_lowercase();
            label_ids.insert(key.clone(), label.id);
            desired.push(key);
        }

        let existing: Vec<(i64, String)> = label::for_issue(self.uow.conn().await?, issue.id)
            .await?
            .into_iter()
            .map(|(join_id, label)| (join_id, label.name.to_lowercase()))
            .collect();

        let diff = diff_collection(&existing, &desired);
        for join_id in &diff.to_remove {
            label::detach(self.uow.conn().await?, *join_id).await?;
        }
        for name in &diff.to_add {
            if let Some(label_id) = label_ids.get(name) {
                label::attach(self.uow.conn().await?, issue.id, *label_id).await?;
            }
        }

        self.stats.labels_added += diff.to_add.len() as u64;
        self.stats.labels_removed += diff.to_remove.len() as u64;
        Ok(())
    }

    /// Replace the issue's outbound links with those found in its body.
    async fn sync_links(
        &mut self,
        repository: &Repository,
        issue: &Issue,
        body: Option<&str>,
    ) -> Result<(), AppError> {
        issue_link::delete_for_issue(self.uow.conn().await?, issue.id).await?;

        for parsed in link_scanner::scan(body) {
            let target_repository = if parsed.is_same_repository()
                || repository.reference().matches(&parsed.owner, &parsed.repo)
            {
                repository.clone()
            } else {
                self.sync_repository_by_name(&parsed.owner, &parsed.repo)
                    .await?
            };

            let target_issue_id =
                issue::find_by_number(self.uow.conn().await?, target_repository.id, parsed.number)
                    .await?
                    .map(|target| target.id);

            issue_link::insert(
                self.uow.conn().await?,
                issue.id,
                &parsed.link_type,
                target_repository.id,
                parsed.number,
                target_issue_id,
            )
            .await?;
            self.stats.links_written += 1;
        }

        Ok(())
    }
}
