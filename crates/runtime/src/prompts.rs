//! Prompt assembly: history windowing and the compaction prompt pair.

use relay_domain::config::RunConfig;
use relay_domain::message::{Message, Role};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const COMPACTION_SYSTEM_PROMPT: &str = "你是一个“对话压缩器（Conversation Compactor）”。

你的任务是把给定的对话记录压缩成一段可用于“继续工作”的 handoff 摘要。

硬性约束：
- 不要输出任何密钥、token、密码、私钥等敏感信息；若对话中出现，请用 <redacted> 替代。
- 不要编造不存在的事实；不确定的内容明确标注“不确定/待确认”。
- 输出必须结构化、可执行，方便另一个 agent/人类接手继续推进。";

pub const COMPACTION_USER_PROMPT_TEMPLATE: &str = "请根据下面的“任务描述”和“对话节选”，生成一段 handoff 摘要。

任务描述：
{task}

对话节选（可能不完整；请以可见内容为准）：
{transcript}

输出格式（Markdown）：
1) 目标/范围（Goal/Scope）
2) 已完成进展（Progress）
3) 关键决策与理由（Key Decisions）
4) 当前状态/阻塞点（Current State / Blockers）
5) 下一步建议（Next Steps）
6) 风险与注意事项（Risks / Notes）

再次提醒：不要泄露 secrets；遇到疑似敏感值用 <redacted>。";

pub const SUMMARY_PREFIX: &str = "[对话压缩摘要｜handoff]
说明：这是一次上下文压缩生成的摘要，用于继续推进任务；可能遗漏细节。
";

/// Per-tool-output clip applied before the global transcript clip.
const TOOL_OUTPUT_CLIP_CHARS: usize = 800;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History windowing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn message_char_len(msg: &Message) -> usize {
    msg.content.as_deref().map(str::len).unwrap_or(0)
}

/// Sliding-window trim keeping the most recent messages.
///
/// Returns the kept tail (original order) and the dropped count.
pub fn trim_history(
    history: &[Message],
    max_messages: usize,
    max_chars: usize,
) -> (Vec<Message>, usize) {
    if history.is_empty() {
        return (Vec::new(), 0);
    }
    if max_messages == 0 || max_chars == 0 {
        return (Vec::new(), history.len());
    }

    let start = history.len().saturating_sub(max_messages);
    let mut kept: Vec<Message> = history[start..].to_vec();
    let mut dropped = start;

    let mut total: usize = kept.iter().map(message_char_len).sum();
    while !kept.is_empty() && total > max_chars {
        let first = kept.remove(0);
        total -= message_char_len(&first);
        dropped += 1;
    }
    (kept, dropped)
}

/// Assemble one turn's messages: system prompt (+ injected skill bodies)
/// followed by the trimmed history (the task rides in history as the
/// first user message).
pub fn build_messages(
    system_prompt: &str,
    skill_bodies: &[String],
    history: &[Message],
    cfg: &RunConfig,
) -> (Vec<Message>, usize) {
    let mut system = system_prompt.to_owned();
    for body in skill_bodies {
        system.push_str("\n\n");
        system.push_str(body);
    }

    let (kept, dropped) = trim_history(history, cfg.history_max_messages, cfg.history_max_chars);
    if dropped > 0 {
        tracing::debug!(dropped, "history trimmed before LLM request");
    }

    let mut messages = Vec::with_capacity(kept.len() + 1);
    messages.push(Message::system(system));
    messages.extend(kept);
    (messages, dropped)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Clip to `max_chars`, keeping head and tail with an ellipsis between.
pub fn clip_text_middle(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_owned();
    }
    if max_chars <= 50 {
        let head: String = chars[..max_chars.saturating_sub(3)].iter().collect();
        return format!("{head}...");
    }
    let head_len = max_chars / 3;
    let tail_len = max_chars - head_len - 5;
    let head: String = chars[..head_len].iter().collect();
    let tail: String = chars[chars.len() - tail_len..].iter().collect();
    format!("{head}\n...\n{tail}")
}

/// Format the loop's history as the compaction-turn transcript.
///
/// Keeps the last `keep_last_messages` user/assistant messages verbatim;
/// tool outputs are reduced to ok/error_kind headers plus clipped
/// stdout/stderr.
pub fn format_history_for_compaction(
    history: &[Message],
    max_chars: usize,
    keep_last_messages: usize,
) -> String {
    let ua_indices: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| matches!(m.role, Role::User | Role::Assistant))
        .map(|(i, _)| i)
        .collect();
    let tail_start = ua_indices.len().saturating_sub(keep_last_messages);
    let verbatim: std::collections::HashSet<usize> =
        ua_indices[tail_start..].iter().copied().collect();

    let mut sections: Vec<String> = Vec::new();
    for (i, msg) in history.iter().enumerate() {
        match msg.role {
            Role::User | Role::Assistant => {
                if !verbatim.contains(&i) {
                    continue;
                }
                let Some(content) = msg.content.as_deref().filter(|c| !c.trim().is_empty()) else {
                    continue;
                };
                let role = if msg.role == Role::User { "USER" } else { "ASSISTANT" };
                sections.push(format!("{role}:\n{}", content.trim()));
            }
            Role::Tool => {
                let Some(raw) = msg.content.as_deref().filter(|c| !c.trim().is_empty()) else {
                    continue;
                };
                let call_id = msg.tool_call_id.as_deref().unwrap_or("");
                let mut ok = None;
                let mut error_kind = None;
                let mut stdout = String::new();
                let mut stderr = String::new();
                if let Ok(obj) = serde_json::from_str::<serde_json::Value>(raw) {
                    ok = obj.get("ok").and_then(|v| v.as_bool());
                    error_kind = obj
                        .get("error_kind")
                        .and_then(|v| v.as_str())
                        .map(str::to_owned);
                    stdout = obj
                        .get("stdout")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_owned();
                    stderr = obj
                        .get("stderr")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_owned();
                }
                let head = format!(
                    "TOOL(tool_call_id={call_id}, ok={ok:?}, error_kind={error_kind:?})"
                );
                let mut body = Vec::new();
                if !stdout.trim().is_empty() {
                    body.push(format!(
                        "stdout:\n{}",
                        clip_text_middle(stdout.trim(), TOOL_OUTPUT_CLIP_CHARS)
                    ));
                }
                if !stderr.trim().is_empty() {
                    body.push(format!(
                        "stderr:\n{}",
                        clip_text_middle(stderr.trim(), TOOL_OUTPUT_CLIP_CHARS)
                    ));
                }
                if body.is_empty() {
                    body.push(clip_text_middle(raw.trim(), TOOL_OUTPUT_CLIP_CHARS));
                }
                sections.push(format!("{head}\n{}", body.join("\n")));
            }
            Role::System => {}
        }
    }

    clip_text_middle(&sections.join("\n\n---\n\n"), max_chars)
}

/// The fixed prompt pair for a compaction turn (tools disabled).
pub fn build_compaction_messages(task: &str, transcript: &str) -> Vec<Message> {
    let user = COMPACTION_USER_PROMPT_TEMPLATE
        .replace("{task}", task.trim())
        .replace("{transcript}", transcript.trim());
    vec![
        Message::system(COMPACTION_SYSTEM_PROMPT.trim()),
        Message::user(user.trim()),
    ]
}
