//! 预填流程 - 流程层
//!
//! 让学生用自己之前某次作答的答案作为第 n 次作答的起点，可整体复制，也可逐题勾选。
//! 复制的答案走与手动输入相同的保存路径，保存到*当前*作答下，之前作答的记录不受影响。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::clients::Backend;
use crate::error::{AppError, AppResult};
use crate::models::{FeedbackItem, Question, QuestionKind, SessionCtx, SubmittedAnswer};
use crate::services::{DraftStore, PersistenceScheduler};
use crate::utils::truncate_text;

/// 可作为预填来源的历史作答
#[derive(Debug, Clone, Default)]
pub struct PreviousAttempt {
    pub number: u32,
    /// 题目 → 该次作答的非空答案
    pub answers: BTreeMap<String, SubmittedAnswer>,
    /// 题目 → 该次作答的反馈（用于显示对/错标记）
    pub feedback: HashMap<String, FeedbackItem>,
}

impl PreviousAttempt {
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }
}

/// 预填面板中单道题的预览
#[derive(Debug, Clone, PartialEq)]
pub struct PrefillPreview {
    pub question_id: String,
    /// 题目序号（从 1 开始）
    pub display_index: usize,
    pub kind_label: &'static str,
    pub question_text: String,
    pub answer_preview: String,
    pub is_correct: Option<bool>,
    pub selected: bool,
}

/// 一次预填的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefillReport {
    pub from_attempt: u32,
    pub saved: Vec<String>,
}

/// 预填协调器
pub struct PrefillReconciler {
    ctx: SessionCtx,
    questions: Vec<Question>,
    sources: Vec<PreviousAttempt>,
    selected_attempt: Option<u32>,
    selected_questions: BTreeSet<String>,
}

impl PrefillReconciler {
    pub fn new(ctx: SessionCtx, questions: Vec<Question>) -> Self {
        Self {
            ctx,
            questions,
            sources: Vec::new(),
            selected_attempt: None,
            selected_questions: BTreeSet::new(),
        }
    }

    /// 加载已完成作答的答案与反馈
    ///
    /// 没有任何非空答案的作答会被过滤掉；某次作答读取失败按"无数据"处理。
    pub async fn load_sources(&mut self, backend: &dyn Backend, completed: &[u32]) -> usize {
        let ctx = &self.ctx;
        let fetches = completed.iter().map(|&attempt| async move {
            let result = backend
                .my_answers(&ctx.student_id, &ctx.module_id, attempt)
                .await;
            (attempt, result)
        });
        let fetched = join_all(fetches).await;

        let feedback = match backend.feedback(&self.ctx.student_id).await {
            Ok(items) => items,
            Err(e) => {
                debug!("{} 读取历史反馈失败，预填面板不显示对错: {}", self.ctx, e);
                Vec::new()
            }
        };

        let mut sources = Vec::new();
        for (attempt, result) in fetched {
            let answers = match result {
                Ok(answers) => answers,
                Err(e) => {
                    warn!("{} ⚠️ 读取第 {} 次作答失败: {}", self.ctx, attempt, e);
                    continue;
                }
            };

            let answers: BTreeMap<String, SubmittedAnswer> = answers
                .into_iter()
                .filter(|a| a.has_value() && self.question(&a.question_id).is_some())
                .map(|a| (a.question_id.clone(), a))
                .collect();

            if answers.is_empty() {
                continue;
            }

            let feedback = feedback
                .iter()
                .filter(|f| f.attempt == attempt)
                .map(|f| (f.question_id.clone(), f.clone()))
                .collect();

            sources.push(PreviousAttempt {
                number: attempt,
                answers,
                feedback,
            });
        }

        sources.sort_by_key(|s| s.number);
        info!("{} 找到 {} 个可预填的历史作答", self.ctx, sources.len());

        self.selected_attempt = sources.last().map(|s| s.number);
        self.selected_questions.clear();
        self.sources = sources;
        self.sources.len()
    }

    pub fn sources(&self) -> &[PreviousAttempt] {
        &self.sources
    }

    pub fn source(&self, attempt: u32) -> Option<&PreviousAttempt> {
        self.sources.iter().find(|s| s.number == attempt)
    }

    pub fn selected_attempt(&self) -> Option<u32> {
        self.selected_attempt
    }

    /// 切换来源作答；已勾选的题目随之清空
    pub fn select_attempt(&mut self, attempt: u32) -> AppResult<()> {
        if self.source(attempt).is_none() {
            return Err(AppError::NoPrefillSource { attempt });
        }
        if self.selected_attempt != Some(attempt) {
            self.selected_attempt = Some(attempt);
            self.selected_questions.clear();
        }
        Ok(())
    }

    /// 勾选 / 取消勾选一道题，返回是否处于勾选状态
    pub fn toggle_question(&mut self, question_id: &str) -> bool {
        let available = self
            .selected_attempt
            .and_then(|a| self.source(a))
            .is_some_and(|s| s.answers.contains_key(question_id));
        if !available {
            return false;
        }
        if !self.selected_questions.remove(question_id) {
            self.selected_questions.insert(question_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected_questions(&self) -> &BTreeSet<String> {
        &self.selected_questions
    }

    /// 当前来源中有答案的题目预览，按题目顺序
    pub fn previews(&self) -> Vec<PrefillPreview> {
        let Some(source) = self.selected_attempt.and_then(|a| self.source(a)) else {
            return Vec::new();
        };

        self.questions
            .iter()
            .enumerate()
            .filter_map(|(index, question)| {
                let answer = source.answers.get(&question.id)?;
                Some(PrefillPreview {
                    question_id: question.id.clone(),
                    display_index: index + 1,
                    kind_label: question.kind.label(),
                    question_text: truncate_text(&question.text, 60),
                    answer_preview: answer_preview(question, &answer.value),
                    is_correct: source.feedback.get(&question.id).map(|f| f.is_correct),
                    selected: self.selected_questions.contains(&question.id),
                })
            })
            .collect()
    }

    /// 整体预填
    pub async fn prefill_all(
        &self,
        from_attempt: u32,
        store: &DraftStore,
        scheduler: &PersistenceScheduler,
    ) -> AppResult<PrefillReport> {
        self.apply(from_attempt, None, store, scheduler).await
    }

    /// 只预填勾选的题目；成功后清空勾选
    pub async fn prefill_selected(
        &mut self,
        store: &DraftStore,
        scheduler: &PersistenceScheduler,
    ) -> AppResult<PrefillReport> {
        let from_attempt = self
            .selected_attempt
            .ok_or(AppError::NoPrefillSource { attempt: 0 })?;
        let selection = std::mem::take(&mut self.selected_questions);
        self.apply(from_attempt, Some(&selection), store, scheduler)
            .await
    }

    async fn apply(
        &self,
        from_attempt: u32,
        only: Option<&BTreeSet<String>>,
        store: &DraftStore,
        scheduler: &PersistenceScheduler,
    ) -> AppResult<PrefillReport> {
        let source = self
            .source(from_attempt)
            .filter(|_| from_attempt < store.attempt())
            .ok_or(AppError::NoPrefillSource {
                attempt: from_attempt,
            })?;

        let copied: Vec<String> = source
            .answers
            .iter()
            .filter(|(qid, _)| only.map_or(true, |set| set.contains(*qid)))
            .map(|(qid, answer)| {
                store.set_prefilled(qid, &answer.value, from_attempt);
                qid.clone()
            })
            .collect();

        if copied.is_empty() {
            return Err(AppError::NoPrefillSource {
                attempt: from_attempt,
            });
        }

        info!(
            "{} 📋 从第 {} 次作答复制 {} 道题到第 {} 次作答",
            self.ctx,
            from_attempt,
            copied.len(),
            store.attempt()
        );

        // 各题保存相互独立，单题失败不回滚其他题目
        let saves = copied.iter().map(|qid| async move {
            (qid.clone(), scheduler.save_now(qid).await)
        });
        let results = join_all(saves).await;

        let mut saved = Vec::new();
        let mut failed = Vec::new();
        for (qid, result) in results {
            match result {
                Ok(()) => saved.push(qid),
                Err(_) => failed.push(qid),
            }
        }

        if !failed.is_empty() {
            warn!(
                "{} ⚠️ 预填部分失败: 成功 {}, 失败 {}，答案已填入，请检查后手动保存",
                self.ctx,
                saved.len(),
                failed.len()
            );
            return Err(AppError::PartialPrefillFailure {
                saved: saved.len(),
                failed,
            });
        }

        Ok(PrefillReport {
            from_attempt,
            saved,
        })
    }

    fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

/// 选择题显示 "B. 选项文本"，文本题截断显示
fn answer_preview(question: &Question, value: &str) -> String {
    if question.kind == QuestionKind::MultipleChoice {
        if let Some(option) = question.options.get(value) {
            return format!("{}. {}", value, truncate_text(option, 50));
        }
        return value.to_string();
    }
    truncate_text(value, 80)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcq_preview_shows_option_text() {
        let question = Question::new("q1", QuestionKind::MultipleChoice, "Which organelle?")
            .with_options([("A", "Nucleus"), ("B", "Mitochondria")]);
        assert_eq!(answer_preview(&question, "B"), "B. Mitochondria");
        assert_eq!(answer_preview(&question, "Z"), "Z");
    }

    #[test]
    fn text_preview_is_truncated() {
        let question = Question::new("q2", QuestionKind::LongText, "Explain.");
        let long = "x".repeat(100);
        let preview = answer_preview(&question, &long);
        assert_eq!(preview.chars().count(), 83);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn toggle_requires_answer_in_selected_source() {
        let questions = vec![
            Question::new("q1", QuestionKind::ShortText, "One"),
            Question::new("q2", QuestionKind::ShortText, "Two"),
        ];
        let mut prefill = PrefillReconciler::new(SessionCtx::new("s1", "m1"), questions);
        prefill.sources = vec![PreviousAttempt {
            number: 1,
            answers: BTreeMap::from([(
                "q1".to_string(),
                SubmittedAnswer {
                    id: None,
                    question_id: "q1".to_string(),
                    value: "answer".to_string(),
                    correct: None,
                    attempt: 1,
                },
            )]),
            feedback: HashMap::new(),
        }];
        prefill.selected_attempt = Some(1);

        assert!(prefill.toggle_question("q1"));
        assert!(!prefill.toggle_question("q2"));
        assert!(!prefill.toggle_question("q1"));
        assert!(prefill.selected_questions().is_empty());
    }
}
