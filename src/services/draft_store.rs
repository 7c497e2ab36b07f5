//! 草稿存储 - 业务能力层
//!
//! 当前作答的权威内存副本：`question_id → DraftAnswer`。
//! 存储本身只负责数据；每次变更后的持久化调度由 `TestSession` 统一触发。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{is_blank, DraftAnswer, Origin};

/// 一次写入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftChange {
    /// 值未变化，不需要保存
    Unchanged,
    /// 写入了新的非空值
    Updated,
    /// 草稿被清空（需要发送删除信号）
    Cleared,
}

impl DraftChange {
    pub fn needs_save(self) -> bool {
        !matches!(self, DraftChange::Unchanged)
    }
}

/// 某一时刻的草稿快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftSnapshot {
    pub attempt: u32,
    pub entries: BTreeMap<String, DraftAnswer>,
}

#[derive(Debug)]
struct DraftState {
    attempt: u32,
    entries: HashMap<String, DraftAnswer>,
}

/// 草稿存储
///
/// 任意时刻所有草稿都属于同一个作答次数；跨越作答边界时整体清空。
/// 防抖定时器在触发时从这里读取最新值，而不是使用调度时捕获的值。
#[derive(Debug)]
pub struct DraftStore {
    state: Mutex<DraftState>,
}

impl DraftStore {
    pub fn new(attempt: u32) -> Self {
        Self {
            state: Mutex::new(DraftState {
                attempt,
                entries: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DraftState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前草稿所属的作答次数
    pub fn attempt(&self) -> u32 {
        self.lock().attempt
    }

    pub fn get(&self, question_id: &str) -> Option<DraftAnswer> {
        self.lock().entries.get(question_id).cloned()
    }

    /// 读取最新值（无草稿时为空字符串）
    pub fn current_value(&self, question_id: &str) -> String {
        self.lock()
            .entries
            .get(question_id)
            .map(|d| d.value.clone())
            .unwrap_or_default()
    }

    /// 学生输入
    ///
    /// 与当前值相同则不做任何事；修改预填的答案会把来源降级为 `Typed`。
    pub fn set(&self, question_id: &str, value: &str) -> DraftChange {
        self.write(question_id, value, Origin::Typed)
    }

    /// 预填写入，来源标记为 `Prefilled`
    pub fn set_prefilled(&self, question_id: &str, value: &str, from_attempt: u32) -> DraftChange {
        self.write(question_id, value, Origin::Prefilled { from_attempt })
    }

    pub fn clear(&self, question_id: &str) -> DraftChange {
        self.write(question_id, "", Origin::Typed)
    }

    fn write(&self, question_id: &str, value: &str, origin: Origin) -> DraftChange {
        let mut state = self.lock();
        let attempt = state.attempt;

        if is_blank(value) {
            return match state.entries.remove(question_id) {
                Some(_) => DraftChange::Cleared,
                None => DraftChange::Unchanged,
            };
        }

        match state.entries.get_mut(question_id) {
            Some(existing) if existing.value == value => {
                // 预填覆盖同值的手动输入时仍要打上标记
                if matches!(origin, Origin::Prefilled { .. }) {
                    existing.origin = origin;
                }
                DraftChange::Unchanged
            }
            Some(existing) => {
                existing.value = value.to_string();
                existing.origin = origin;
                DraftChange::Updated
            }
            None => {
                state.entries.insert(
                    question_id.to_string(),
                    DraftAnswer {
                        value: value.to_string(),
                        attempt,
                        origin,
                    },
                );
                DraftChange::Updated
            }
        }
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        let state = self.lock();
        DraftSnapshot {
            attempt: state.attempt,
            entries: state
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// 有非空答案的题目数量
    pub fn answered_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// 跨越作答边界：清空全部草稿并切换作答次数
    pub fn reset(&self, attempt: u32) {
        let mut state = self.lock();
        state.attempt = attempt;
        state.entries.clear();
    }

    /// 用后端已持久化的答案恢复草稿（页面重新加载时），不会触发保存
    pub fn hydrate<I>(&self, attempt: u32, answers: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut state = self.lock();
        state.attempt = attempt;
        state.entries.clear();
        for (question_id, value) in answers {
            if is_blank(&value) {
                continue;
            }
            state.entries.insert(
                question_id,
                DraftAnswer {
                    value,
                    attempt,
                    origin: Origin::Typed,
                },
            );
        }
        state.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_is_a_no_op() {
        let store = DraftStore::new(1);
        assert_eq!(store.set("q1", "photosynthesis"), DraftChange::Updated);
        assert_eq!(store.set("q1", "photosynthesis"), DraftChange::Unchanged);
        assert_eq!(store.answered_count(), 1);
    }

    #[test]
    fn blank_value_removes_entry() {
        let store = DraftStore::new(1);
        store.set("q1", "draft");
        assert_eq!(store.set("q1", "   "), DraftChange::Cleared);
        assert!(store.get("q1").is_none());
        assert_eq!(store.clear("q1"), DraftChange::Unchanged);
    }

    #[test]
    fn editing_prefilled_entry_demotes_origin() {
        let store = DraftStore::new(2);
        store.set_prefilled("q1", "B", 1);
        store.set_prefilled("q2", "osmosis", 1);

        store.set("q2", "osmosis and diffusion");

        assert!(store.get("q1").unwrap().is_prefilled());
        let edited = store.get("q2").unwrap();
        assert_eq!(edited.origin, Origin::Typed);
        assert_eq!(edited.attempt, 2);
    }

    #[test]
    fn retyping_same_value_keeps_prefilled_tag() {
        let store = DraftStore::new(2);
        store.set_prefilled("q1", "B", 1);
        assert_eq!(store.set("q1", "B"), DraftChange::Unchanged);
        assert!(store.get("q1").unwrap().is_prefilled());
    }

    #[test]
    fn reset_scopes_drafts_to_new_attempt() {
        let store = DraftStore::new(1);
        store.set("q1", "a");
        store.set("q2", "b");

        store.reset(2);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.attempt, 2);
        assert!(snapshot.entries.is_empty());
    }

    #[test]
    fn hydrate_skips_blank_answers() {
        let store = DraftStore::new(1);
        let loaded = store.hydrate(
            3,
            vec![
                ("q1".to_string(), "kept".to_string()),
                ("q2".to_string(), "  ".to_string()),
            ],
        );
        assert_eq!(loaded, 1);
        assert_eq!(store.current_value("q1"), "kept");
        assert_eq!(store.current_value("q2"), "");
        assert_eq!(store.get("q1").unwrap().attempt, 3);
    }
}
