//! Interactive loops: classroom chat with teacher/peer, and the
//! examiner-driven test session. Plain line-oriented stdio; every loop
//! iteration persists the session locally and nudges the background saver.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;

use stoa_core::export::full_export;
use stoa_core::{
    invoke_role, ChatTurn, EvaluationConfig, Language, LlmClient, LogEntry, LogSink, NextAction,
    Role, SessionState, SessionStore, TestSession, TestTurn, UnifiedLog,
};

fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None); // EOF
    }
    Ok(Some(line.trim().to_string()))
}

fn persist(
    store: &dyn SessionStore,
    autosaver: &crate::autosave::Autosaver,
    state: &SessionState,
) {
    if let Err(err) = store.save(state) {
        tracing::error!(error = %err, "failed to save session state");
    }
    autosaver.notify(full_export(state), &state.meta);
}

/// Classroom chat with the teacher or the peer.
pub fn run_classroom(
    store: &dyn SessionStore,
    client: &dyn LlmClient,
    autosaver: &crate::autosave::Autosaver,
    state: &mut SessionState,
    role: Role,
) -> Result<()> {
    let language = state.language();
    let speaker = role.speaker_name(language);
    println!("Chatting with {speaker}. Type /quit to leave.");

    loop {
        let line = match prompt_line("> ")? {
            Some(line) => line,
            None => break,
        };
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        // Context snapshot first, so the new message only enters the call
        // once, through the per-role transcript.
        let mut messages = UnifiedLog::to_chat_messages(&state.unified_log.context_history());

        let username = state.meta.username.clone();
        state
            .unified_log
            .append(LogEntry::new(stoa_core::AgentType::User, &line, username));
        if let Some(transcript) = state.conversations.for_role_mut(role) {
            transcript.push(ChatTurn::user(&line));
        }
        state.meta.turn_count += 1;

        if let Some(transcript) = state.conversations.for_role(role) {
            messages.extend(transcript.iter().map(ChatTurn::to_chat_message));
        }

        let level = state.current_test_level;
        match invoke_role(client, role, language, level, messages) {
            Ok(reply) => {
                println!("\n{speaker}: {reply}\n");
                state
                    .unified_log
                    .append(LogEntry::new(role.agent_type(), &reply, speaker));
                if let Some(transcript) = state.conversations.for_role_mut(role) {
                    transcript.push(ChatTurn::assistant(&reply));
                }
            }
            Err(err) => {
                eprintln!("Error: {err}");
            }
        }

        persist(store, autosaver, state);
    }

    Ok(())
}

/// The examiner-driven test session over all six Bloom levels.
#[allow(clippy::too_many_arguments)]
pub fn run_test(
    store: &dyn SessionStore,
    client: &dyn LlmClient,
    sink: Arc<dyn LogSink + Send + Sync>,
    autosaver: &crate::autosave::Autosaver,
    state: SessionState,
    evaluation: EvaluationConfig,
    min_classroom_rounds: u32,
) -> Result<SessionState> {
    let language = state.language();
    let rounds = state.conversations.completed_rounds() as u32;
    if rounds < min_classroom_rounds {
        println!(
            "{}",
            match language {
                Language::En => format!(
                    "Please complete at least {min_classroom_rounds} conversation rounds before starting the test. Currently completed: {rounds} rounds."
                ),
                Language::Zh => format!(
                    "请先完成至少 {min_classroom_rounds} 轮对话后再开始测试。当前已完成 {rounds} 轮。"
                ),
            }
        );
        return Ok(state);
    }

    let mut session = TestSession::new(state, evaluation);
    println!(
        "{}",
        match language {
            Language::En => "Say hello to the examiner to begin the Bloom-level journey. \
                             Commands: /again, /next, /end, /quit.",
            Language::Zh => "向考官打个招呼，他会按照 Bloom 层级来引导你。\
                             命令：/again、/next、/end、/quit。",
        }
    );

    loop {
        let hint = if session.awaiting_next_action() {
            match language {
                Language::En => "[/again or /next] > ",
                Language::Zh => "[/again 或 /next] > ",
            }
        } else {
            "> "
        };
        let line = match prompt_line(hint)? {
            Some(line) => line,
            None => break,
        };
        if line.is_empty() {
            continue;
        }

        match line.as_str() {
            "/quit" => break,
            "/end" => {
                let exported = session.finish(sink.as_ref(), store);
                if !exported {
                    eprintln!("Warning: export failed; local state was cleared anyway.");
                }
                let state = session.into_state();
                return Ok(SessionState::new(state.meta.username, state.meta.language));
            }
            "/again" | "/next" => {
                let action = if line == "/again" {
                    NextAction::AnotherQuestion
                } else {
                    NextAction::NextLevel
                };
                match session.resolve_next_action(client, action) {
                    Ok(Some(question)) => {
                        print_examiner(&question, language);
                    }
                    Ok(None) => println!(
                        "{}",
                        match language {
                            Language::En => "Already at the highest level.",
                            Language::Zh => "已经是最高层级。",
                        }
                    ),
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
            text => match session.handle_user_message(client, text) {
                Ok(TestTurn::QuestionIssued(question)) => {
                    print_examiner(&question, language);
                }
                Ok(TestTurn::Evaluated(entry)) => {
                    print_feedback(&entry, language);
                    if session.is_complete() {
                        println!(
                            "{}",
                            match language {
                                Language::En =>
                                    "All six levels completed. Exporting and closing the session.",
                                Language::Zh => "六个层级全部完成。正在导出并结束本次学习。",
                            }
                        );
                        session.finish(sink.as_ref(), store);
                        let state = session.into_state();
                        let fresh =
                            SessionState::new(state.meta.username, state.meta.language);
                        return Ok(fresh);
                    }
                }
                Ok(TestTurn::ChooseNextAction) => println!(
                    "{}",
                    match language {
                        Language::En =>
                            "The evaluation for this round is finished. Choose /again for another question or /next for the next level.",
                        Language::Zh =>
                            "本轮评估已完成，请选择 /again 再来一个问题，或 /next 进入下一层级。",
                    }
                ),
                Ok(TestTurn::SessionComplete) => break,
                Err(err) => eprintln!("Error: {err}"),
            },
        }

        persist(store, autosaver, &session.state);
    }

    Ok(session.into_state())
}

fn print_examiner(question: &str, language: Language) {
    let name = Role::Examiner.speaker_name(language);
    println!("\n{name}: {question}\n");
}

fn print_feedback(entry: &stoa_core::FeedbackEntry, language: Language) {
    println!();
    for evaluator in &entry.evaluators {
        println!("  {}: {:.1}/10", evaluator.label, evaluator.raw_score);
    }
    println!(
        "{}",
        match language {
            Language::En => format!(
                "  Average of three evaluators: {:.1}/10",
                entry.average_raw_score
            ),
            Language::Zh => format!("  三位评估者平均分：{:.1}/10", entry.average_raw_score),
        }
    );
    println!(
        "{}",
        match language {
            Language::En => format!("  Task \"{}\" score: {:.1}/10", entry.task_name, entry.score),
            Language::Zh => format!("  任务「{}」得分：{:.1}/10", entry.task_name, entry.score),
        }
    );
    if entry.credibility == 1 {
        println!(
            "{}",
            match language {
                Language::En => "  (Evaluators disagreed noticeably; treat this score with care.)",
                Language::Zh => "  （评估者意见分歧较大，该得分仅供参考。）",
            }
        );
    }
    println!("\n{}\n", entry.summary);
}
