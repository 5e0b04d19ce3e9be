use anyhow::Result;
use rusqlite::{Connection, params};

use agora_types::models::QuestStatus;

use super::OptionalExt;
use super::points::credit_points;
use crate::Database;
use crate::models::{ParticipantRow, QuestRow, QuestTaskRow};

/// Partial update of a draft quest.
#[derive(Debug, Default, Clone)]
pub struct QuestChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reward_points: Option<i64>,
    pub start_at: Option<i64>,
    pub end_at: Option<i64>,
}

pub enum QuestEditOutcome {
    NotFound,
    NotDraft { current: String },
    InvalidWindow,
    Updated(QuestRow),
}

pub enum TransitionOutcome {
    NotFound,
    Invalid { current: String },
    NoTasks,
    Expired,
    Updated(QuestRow),
}

pub enum JoinOutcome {
    NotFound,
    NotActive,
    OutsideWindow,
    Joined { progress: ParticipantRow, newly: bool },
}

pub enum TaskOutcome {
    QuestNotFound,
    TaskNotFound,
    NotActive,
    NotParticipant,
    AlreadyCompleted(ParticipantRow),
    Completed {
        progress: ParticipantRow,
        points_awarded: i64,
        quest_completed: bool,
    },
}

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn create_quest(
        &self,
        id: &str,
        title: &str,
        description: &str,
        reward_points: i64,
        start_at: i64,
        end_at: i64,
        created_by: &str,
        now: i64,
    ) -> Result<QuestRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO quests (id, title, description, reward_points, start_at, end_at, status,
                     created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7, ?8, ?8)",
                params![id, title, description, reward_points, start_at, end_at, created_by, now],
            )?;
            load_quest(conn, id)?.ok_or_else(|| anyhow::anyhow!("Quest not persisted: {}", id))
        })
    }

    pub fn update_quest(&self, id: &str, changes: &QuestChanges, now: i64) -> Result<QuestEditOutcome> {
        self.with_conn_mut(|conn| {
            let Some(quest) = load_quest(conn, id)? else {
                return Ok(QuestEditOutcome::NotFound);
            };
            if quest.status != QuestStatus::Draft.as_str() {
                return Ok(QuestEditOutcome::NotDraft { current: quest.status });
            }

            let start_at = changes.start_at.unwrap_or(quest.start_at);
            let end_at = changes.end_at.unwrap_or(quest.end_at);
            if end_at <= start_at {
                return Ok(QuestEditOutcome::InvalidWindow);
            }

            conn.execute(
                "UPDATE quests SET title = ?2, description = ?3, reward_points = ?4,
                     start_at = ?5, end_at = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    changes.title.as_deref().unwrap_or(&quest.title),
                    changes.description.as_deref().unwrap_or(&quest.description),
                    changes.reward_points.unwrap_or(quest.reward_points),
                    start_at,
                    end_at,
                    now,
                ],
            )?;

            let updated = load_quest(conn, id)?.ok_or_else(|| anyhow::anyhow!("Quest vanished: {}", id))?;
            Ok(QuestEditOutcome::Updated(updated))
        })
    }

    /// Appends a task to a draft quest.
    pub fn add_quest_task(
        &self,
        quest_id: &str,
        task_id: &str,
        title: &str,
        kind: &str,
        points: i64,
        now: i64,
    ) -> Result<QuestEditOutcome> {
        self.with_conn_mut(|conn| {
            let Some(quest) = load_quest(conn, quest_id)? else {
                return Ok(QuestEditOutcome::NotFound);
            };
            if quest.status != QuestStatus::Draft.as_str() {
                return Ok(QuestEditOutcome::NotDraft { current: quest.status });
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO quest_tasks (id, quest_id, title, kind, points, position)
                 VALUES (?1, ?2, ?3, ?4, ?5,
                         (SELECT COALESCE(MAX(position), -1) + 1 FROM quest_tasks WHERE quest_id = ?2))",
                params![task_id, quest_id, title, kind, points],
            )?;
            tx.execute("UPDATE quests SET updated_at = ?2 WHERE id = ?1", params![quest_id, now])?;
            tx.commit()?;

            let updated = load_quest(conn, quest_id)?
                .ok_or_else(|| anyhow::anyhow!("Quest vanished: {}", quest_id))?;
            Ok(QuestEditOutcome::Updated(updated))
        })
    }

    /// Moves a quest along its lifecycle. Activation requires at least one
    /// task and an end time in the future.
    pub fn transition_quest(&self, id: &str, next: QuestStatus, now: i64) -> Result<TransitionOutcome> {
        self.with_conn_mut(|conn| {
            let Some(quest) = load_quest(conn, id)? else {
                return Ok(TransitionOutcome::NotFound);
            };

            let allowed = quest
                .status
                .parse::<QuestStatus>()
                .map(|s| s.can_transition_to(next))
                .unwrap_or(false);
            if !allowed {
                return Ok(TransitionOutcome::Invalid { current: quest.status });
            }

            if next == QuestStatus::Active {
                if quest.tasks.is_empty() {
                    return Ok(TransitionOutcome::NoTasks);
                }
                if quest.end_at <= now {
                    return Ok(TransitionOutcome::Expired);
                }
            }

            conn.execute(
                "UPDATE quests SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, next.as_str(), now],
            )?;
            let updated = load_quest(conn, id)?.ok_or_else(|| anyhow::anyhow!("Quest vanished: {}", id))?;
            Ok(TransitionOutcome::Updated(updated))
        })
    }

    pub fn get_quest(&self, id: &str) -> Result<Option<QuestRow>> {
        self.with_conn(|conn| load_quest(conn, id))
    }

    pub fn list_quests(&self, status: Option<QuestStatus>) -> Result<Vec<QuestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM quests WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY start_at DESC, created_at DESC",
            )?;
            let ids = stmt
                .query_map([status.map(|s| s.as_str())], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut quests = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(q) = load_quest(conn, &id)? {
                    quests.push(q);
                }
            }
            Ok(quests)
        })
    }

    /// Joins an active quest inside its time window. Joining twice is a no-op.
    pub fn join_quest(&self, quest_id: &str, user_id: &str, now: i64) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let Some(quest) = load_quest(conn, quest_id)? else {
                return Ok(JoinOutcome::NotFound);
            };
            if quest.status != QuestStatus::Active.as_str() {
                return Ok(JoinOutcome::NotActive);
            }
            if now < quest.start_at || now >= quest.end_at {
                return Ok(JoinOutcome::OutsideWindow);
            }

            let added = conn.execute(
                "INSERT OR IGNORE INTO quest_participants (quest_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![quest_id, user_id, now],
            )?;
            let progress = load_participant(conn, quest_id, user_id)?
                .ok_or_else(|| anyhow::anyhow!("Participant not persisted: {}", user_id))?;
            Ok(JoinOutcome::Joined {
                progress,
                newly: added > 0,
            })
        })
    }

    /// Marks a task done for a participant and credits its points. Finishing
    /// the last task completes the quest for the participant and credits the
    /// quest reward once.
    pub fn complete_quest_task(
        &self,
        quest_id: &str,
        task_id: &str,
        user_id: &str,
        now: i64,
    ) -> Result<TaskOutcome> {
        self.with_conn_mut(|conn| {
            let Some(quest) = load_quest(conn, quest_id)? else {
                return Ok(TaskOutcome::QuestNotFound);
            };
            let Some(task) = quest.tasks.iter().find(|t| t.id == task_id) else {
                return Ok(TaskOutcome::TaskNotFound);
            };
            if quest.status != QuestStatus::Active.as_str() {
                return Ok(TaskOutcome::NotActive);
            }
            let Some(progress) = load_participant(conn, quest_id, user_id)? else {
                return Ok(TaskOutcome::NotParticipant);
            };
            if progress.completed_task_ids.iter().any(|id| id == task_id) {
                return Ok(TaskOutcome::AlreadyCompleted(progress));
            }

            let quest_completed = progress.completed_task_ids.len() + 1 == quest.tasks.len();
            let awarded = if quest_completed {
                task.points
                    .checked_add(quest.reward_points)
                    .ok_or_else(|| anyhow::anyhow!("Quest {} award overflows", quest_id))?
            } else {
                task.points
            };

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO quest_task_completions (task_id, user_id, completed_at) VALUES (?1, ?2, ?3)",
                params![task_id, user_id, now],
            )?;

            tx.execute(
                "UPDATE quest_participants
                 SET points_earned = points_earned + ?3,
                     completed_at = CASE WHEN ?4 THEN ?5 ELSE completed_at END
                 WHERE quest_id = ?1 AND user_id = ?2",
                params![quest_id, user_id, awarded, quest_completed, now],
            )?;

            if awarded > 0 {
                let reason = format!("quest:{}:task:{}", quest_id, task_id);
                credit_points(&tx, user_id, awarded, &reason, now)?;
            }
            tx.commit()?;

            let progress = load_participant(conn, quest_id, user_id)?
                .ok_or_else(|| anyhow::anyhow!("Participant vanished: {}", user_id))?;
            Ok(TaskOutcome::Completed {
                progress,
                points_awarded: awarded,
                quest_completed,
            })
        })
    }

    pub fn get_quest_participant(&self, quest_id: &str, user_id: &str) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| load_participant(conn, quest_id, user_id))
    }

    pub fn list_quest_participants(&self, quest_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM quest_participants WHERE quest_id = ?1 ORDER BY joined_at, user_id",
            )?;
            let users = stmt
                .query_map([quest_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut rows = Vec::with_capacity(users.len());
            for user in users {
                if let Some(p) = load_participant(conn, quest_id, &user)? {
                    rows.push(p);
                }
            }
            Ok(rows)
        })
    }
}

fn load_quest(conn: &Connection, id: &str) -> Result<Option<QuestRow>> {
    let quest = conn
        .query_row(
            "SELECT q.id, q.title, q.description, q.reward_points, q.start_at, q.end_at, q.status,
                    q.created_by, q.created_at, q.updated_at,
                    (SELECT COUNT(*) FROM quest_participants p WHERE p.quest_id = q.id)
             FROM quests q WHERE q.id = ?1",
            [id],
            |row| {
                Ok(QuestRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    reward_points: row.get(3)?,
                    start_at: row.get(4)?,
                    end_at: row.get(5)?,
                    status: row.get(6)?,
                    created_by: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                    participant_count: row.get::<_, i64>(10)? as u64,
                    tasks: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut quest) = quest else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, quest_id, title, kind, points, position FROM quest_tasks
         WHERE quest_id = ?1 ORDER BY position",
    )?;
    quest.tasks = stmt
        .query_map([id], |row| {
            Ok(QuestTaskRow {
                id: row.get(0)?,
                quest_id: row.get(1)?,
                title: row.get(2)?,
                kind: row.get(3)?,
                points: row.get(4)?,
                position: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(quest))
}

fn load_participant(conn: &Connection, quest_id: &str, user_id: &str) -> Result<Option<ParticipantRow>> {
    let row = conn
        .query_row(
            "SELECT quest_id, user_id, joined_at, points_earned, completed_at
             FROM quest_participants WHERE quest_id = ?1 AND user_id = ?2",
            params![quest_id, user_id],
            |row| {
                Ok(ParticipantRow {
                    quest_id: row.get(0)?,
                    user_id: row.get(1)?,
                    joined_at: row.get(2)?,
                    points_earned: row.get(3)?,
                    completed_at: row.get(4)?,
                    completed_task_ids: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT c.task_id FROM quest_task_completions c
         JOIN quest_tasks t ON t.id = c.task_id
         WHERE t.quest_id = ?1 AND c.user_id = ?2
         ORDER BY t.position",
    )?;
    row.completed_task_ids = stmt
        .query_map(params![quest_id, user_id], |r| r.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(Some(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn active_quest(db: &Database, tasks: &[(&str, i64)]) {
        db.create_quest("q1", "Onboarding", "", 100, 0, 10 * HOUR, "admin", 0).unwrap();
        for (id, points) in tasks {
            db.add_quest_task("q1", id, "task", "social", *points, 0).unwrap();
        }
        assert!(matches!(db.transition_quest("q1", QuestStatus::Active, HOUR).unwrap(), TransitionOutcome::Updated(_)));
    }

    #[test]
    fn test_activation_rules() {
        let db = Database::open_in_memory().unwrap();
        db.create_quest("q1", "Onboarding", "", 50, 0, HOUR, "admin", 0).unwrap();

        assert!(matches!(db.transition_quest("q1", QuestStatus::Active, 10).unwrap(), TransitionOutcome::NoTasks));
        db.add_quest_task("q1", "t1", "Follow", "social", 5, 0).unwrap();
        assert!(matches!(db.transition_quest("q1", QuestStatus::Active, HOUR).unwrap(), TransitionOutcome::Expired));
        assert!(matches!(
            db.transition_quest("q1", QuestStatus::Completed, 10).unwrap(),
            TransitionOutcome::Invalid { ref current } if current == "draft"
        ));
        assert!(matches!(db.transition_quest("q1", QuestStatus::Active, 10).unwrap(), TransitionOutcome::Updated(_)));

        // Active quests are frozen.
        assert!(matches!(
            db.add_quest_task("q1", "t2", "Swap", "onchain", 5, 20).unwrap(),
            QuestEditOutcome::NotDraft { .. }
        ));
        assert!(matches!(
            db.update_quest("q1", &QuestChanges::default(), 20).unwrap(),
            QuestEditOutcome::NotDraft { .. }
        ));
    }

    #[test]
    fn test_update_checks_window() {
        let db = Database::open_in_memory().unwrap();
        db.create_quest("q1", "Onboarding", "", 50, 0, HOUR, "admin", 0).unwrap();
        let bad = QuestChanges {
            end_at: Some(0),
            ..Default::default()
        };
        assert!(matches!(db.update_quest("q1", &bad, 1).unwrap(), QuestEditOutcome::InvalidWindow));

        let rename = QuestChanges {
            title: Some("Welcome".into()),
            ..Default::default()
        };
        match db.update_quest("q1", &rename, 2).unwrap() {
            QuestEditOutcome::Updated(q) => {
                assert_eq!(q.title, "Welcome");
                assert_eq!(q.reward_points, 50);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_task_positions() {
        let db = Database::open_in_memory().unwrap();
        db.create_quest("q1", "Onboarding", "", 0, 0, HOUR, "admin", 0).unwrap();
        db.add_quest_task("q1", "a", "A", "social", 1, 0).unwrap();
        db.add_quest_task("q1", "b", "B", "social", 1, 0).unwrap();
        let quest = db.get_quest("q1").unwrap().unwrap();
        let positions: Vec<(String, u32)> = quest.tasks.iter().map(|t| (t.id.clone(), t.position)).collect();
        assert_eq!(positions, vec![("a".to_string(), 0), ("b".to_string(), 1)]);
    }

    #[test]
    fn test_join_window() {
        let db = Database::open_in_memory().unwrap();
        active_quest(&db, &[("t1", 5)]);

        assert!(matches!(db.join_quest("q1", "ana", 10 * HOUR).unwrap(), JoinOutcome::OutsideWindow));
        assert!(matches!(db.join_quest("q1", "ana", 2 * HOUR).unwrap(), JoinOutcome::Joined { newly: true, .. }));
        assert!(matches!(db.join_quest("q1", "ana", 3 * HOUR).unwrap(), JoinOutcome::Joined { newly: false, .. }));
        assert_eq!(db.get_quest("q1").unwrap().unwrap().participant_count, 1);
    }

    #[test]
    fn test_completion_awards_once() {
        let db = Database::open_in_memory().unwrap();
        active_quest(&db, &[("t1", 5), ("t2", 10)]);

        assert!(matches!(db.complete_quest_task("q1", "t1", "ana", 2 * HOUR).unwrap(), TaskOutcome::NotParticipant));
        db.join_quest("q1", "ana", 2 * HOUR).unwrap();
        assert!(matches!(db.complete_quest_task("q1", "nope", "ana", 2 * HOUR).unwrap(), TaskOutcome::TaskNotFound));

        match db.complete_quest_task("q1", "t1", "ana", 2 * HOUR).unwrap() {
            TaskOutcome::Completed { points_awarded, quest_completed, .. } => {
                assert_eq!(points_awarded, 5);
                assert!(!quest_completed);
            }
            _ => panic!("expected completion"),
        }
        assert!(matches!(db.complete_quest_task("q1", "t1", "ana", 3 * HOUR).unwrap(), TaskOutcome::AlreadyCompleted(_)));

        match db.complete_quest_task("q1", "t2", "ana", 3 * HOUR).unwrap() {
            TaskOutcome::Completed { points_awarded, quest_completed, progress } => {
                assert_eq!(points_awarded, 110);
                assert!(quest_completed);
                assert_eq!(progress.completed_at, Some(3 * HOUR));
                assert_eq!(progress.points_earned, 115);
                assert_eq!(progress.completed_task_ids, vec!["t1".to_string(), "t2".to_string()]);
            }
            _ => panic!("expected completion"),
        }

        let account = db.get_points_account("ana").unwrap().unwrap();
        assert_eq!(account.balance, 115);
        assert_eq!(account.lifetime_earned, 115);
    }

    #[test]
    fn test_overflowing_award_is_not_recorded() {
        let db = Database::open_in_memory().unwrap();
        db.create_quest("q1", "Jackpot", "", i64::MAX, 0, 10 * HOUR, "admin", 0).unwrap();
        db.add_quest_task("q1", "t1", "task", "social", 1, 0).unwrap();
        db.transition_quest("q1", QuestStatus::Active, HOUR).unwrap();
        db.join_quest("q1", "ana", 2 * HOUR).unwrap();

        assert!(db.complete_quest_task("q1", "t1", "ana", 2 * HOUR).is_err());
        let progress = db.get_quest_participant("q1", "ana").unwrap().unwrap();
        assert!(progress.completed_task_ids.is_empty());
        assert!(db.get_points_account("ana").unwrap().is_none());
    }

    #[test]
    fn test_cancelled_quest_rejects_progress() {
        let db = Database::open_in_memory().unwrap();
        active_quest(&db, &[("t1", 5)]);
        db.join_quest("q1", "ana", 2 * HOUR).unwrap();
        db.transition_quest("q1", QuestStatus::Cancelled, 2 * HOUR).unwrap();

        assert!(matches!(db.complete_quest_task("q1", "t1", "ana", 3 * HOUR).unwrap(), TaskOutcome::NotActive));
        assert!(matches!(db.join_quest("q1", "bob", 3 * HOUR).unwrap(), JoinOutcome::NotActive));
        assert_eq!(db.list_quests(Some(QuestStatus::Cancelled)).unwrap().len(), 1);
        assert!(db.list_quests(Some(QuestStatus::Active)).unwrap().is_empty());
    }
}
