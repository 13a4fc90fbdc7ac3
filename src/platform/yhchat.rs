use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatPlatform, RecvType};
use crate::config::YhChatConfig;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    recv_id: &'a str,
    recv_type: RecvType,
    content_type: &'a str,
    content: TextContent<'a>,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecallRequest<'a> {
    msg_id: &'a str,
    chat_id: &'a str,
    chat_type: RecvType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GagRequest<'a> {
    group_id: &'a str,
    user_id: &'a str,
    gag: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveMemberRequest<'a> {
    group_id: &'a str,
    user_id: &'a str,
}

/// Common shape of API replies; `code == 1` means success
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

/// HTTP client for the Yunhu (yhchat) bot and group-management APIs
pub struct YhChatClient {
    client: reqwest::Client,
    config: YhChatConfig,
}

impl YhChatClient {
    pub fn new(config: YhChatConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn bot_url(&self, endpoint: &str) -> String {
        format!(
            "{}/open-apis/v1/bot/{}?token={}",
            self.config.base_url.trim_end_matches('/'),
            endpoint,
            self.config.token
        )
    }

    fn group_url(&self, endpoint: &str) -> String {
        format!(
            "{}/v1/group/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        )
    }

    async fn send(
        &self,
        target_id: &str,
        target_type: RecvType,
        content_type: &str,
        text: &str,
    ) -> Result<()> {
        let request = SendRequest {
            recv_id: target_id,
            recv_type: target_type,
            content_type,
            content: TextContent { text },
        };

        debug!("Sending {} message to {}", content_type, target_id);
        let response = self
            .client
            .post(self.bot_url("send"))
            .json(&request)
            .send()
            .await
            .context("Failed to send message request")?;

        check_response(response, "send").await
    }

    async fn group_call<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.group_url(endpoint))
            .header("token", &self.config.admin_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", endpoint))?;

        check_response(response, endpoint).await
    }
}

async fn check_response(response: reqwest::Response, endpoint: &str) -> Result<()> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("yhchat {} error ({}): {}", endpoint, status, body);
    }

    // Some endpoints answer with an empty or non-JSON body on success
    if let Ok(reply) = serde_json::from_str::<ApiResponse>(&body) {
        if let Some(code) = reply.code {
            if code != 1 {
                anyhow::bail!(
                    "yhchat {} rejected (code {}): {}",
                    endpoint,
                    code,
                    reply.msg.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

#[async_trait]
impl ChatPlatform for YhChatClient {
    async fn send_text(&self, target_id: &str, target_type: RecvType, text: &str) -> Result<()> {
        self.send(target_id, target_type, "text", text).await
    }

    async fn send_markdown(
        &self,
        target_id: &str,
        target_type: RecvType,
        markdown: &str,
    ) -> Result<()> {
        self.send(target_id, target_type, "markdown", markdown).await
    }

    async fn recall_message(&self, msg_id: &str, chat_id: &str) -> Result<()> {
        let request = RecallRequest {
            msg_id,
            chat_id,
            chat_type: RecvType::Group,
        };

        let response = self
            .client
            .post(self.bot_url("recall"))
            .json(&request)
            .send()
            .await
            .context("Failed to send recall request")?;

        check_response(response, "recall").await
    }

    async fn mute(&self, chat_id: &str, user_id: &str, seconds: u64) -> Result<()> {
        let request = GagRequest {
            group_id: chat_id,
            user_id,
            gag: seconds,
        };
        self.group_call("gag-member", &request).await
    }

    async fn remove_member(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let request = RemoveMemberRequest {
            group_id: chat_id,
            user_id,
        };
        self.group_call("remove-member", &request).await
    }
}
