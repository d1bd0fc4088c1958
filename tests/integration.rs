#![cfg(test)]

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use concierge_bot::{
    base::{
        config::{Config, ConfigInner, RetrievalPolicy},
        prompts,
        types::{BotError, ChatTurn, Res, TurnRole, Void},
    },
    interaction::{
        assemble::assemble,
        classify::TurnRequest,
        turn::{ERROR_REPLY, TurnContext, process_turn},
    },
    service::{
        chat::{ChatClient, GenericChatClient},
        db::DbClient,
        llm::{GenericLlmClient, LlmClient},
        retrieval::{GenericRetrievalClient, PassageRecord, RetrievalClient, RetrievedPassage, SurrealRetrievalClient},
    },
};
use mockall::mock;

// Mocks.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_user_id(&self) -> &str;
        async fn start(&self) -> Void;
        async fn post_reply(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;
    }
}

mock! {
    pub Llm {}

    #[async_trait]
    impl GenericLlmClient for Llm {
        async fn complete(&self, turns: &[ChatTurn]) -> Res<String>;
        async fn embed(&self, text: &str) -> Res<Vec<f32>>;
    }
}

mock! {
    pub Retrieval {}

    #[async_trait]
    impl GenericRetrievalClient for Retrieval {
        async fn ensure_collection(&self) -> Void;
        async fn retrieve(&self, query: &str, top_k: usize) -> Res<Vec<RetrievedPassage>>;
        async fn index_passages(&self, passages: &[PassageRecord]) -> Res<usize>;
    }
}

// Helpers.

fn test_config(retrieval_enabled: bool, retrieval_policy: RetrievalPolicy) -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            retrieval_enabled,
            retrieval_policy,
            retrieval_top_k: 2,
            ..Default::default()
        }),
    }
}

fn dm_request(text: &str) -> TurnRequest {
    TurnRequest {
        channel: "D024BE91L".to_string(),
        author: "U2147483697".to_string(),
        text: text.to_string(),
        thread_ts: "1711111111.000100".to_string(),
    }
}

fn context_with(config: Config, db: DbClient, llm: MockLlm, chat: MockChat, retrieval: MockRetrieval) -> TurnContext {
    TurnContext {
        config,
        db,
        llm: LlmClient::new(Arc::new(llm)),
        retrieval: RetrievalClient::new(Arc::new(retrieval)),
        chat: ChatClient::new(Arc::new(chat)),
    }
}

// Message store.

#[tokio::test]
async fn history_is_ordered_and_counted_per_thread() {
    let db = DbClient::memory().await.expect("memory db");

    for text in ["first", "second", "third"] {
        db.append_message("111.001", "D1", "U1", text, TurnRole::User).await.expect("append");
    }
    db.append_message("222.002", "D1", "U1", "elsewhere", TurnRole::User).await.expect("append");

    let history = db.thread_history("111.001").await.expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|t| t.content.as_str()).collect::<Vec<_>>(),
        vec!["first", "second", "third"]
    );

    let other = db.thread_history("222.002").await.expect("history");
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn history_of_unknown_thread_is_empty() {
    let db = DbClient::memory().await.expect("memory db");

    let history = db.thread_history("999.999").await.expect("history");
    assert!(history.is_empty());
}

// Conversation assembly.

#[tokio::test]
async fn assembly_orders_context_history_then_query() {
    let db = DbClient::memory().await.expect("memory db");
    db.append_message("111.001", "D1", "U1", "earlier question", TurnRole::User).await.expect("append");
    db.append_message("111.001", "D1", "U0BOT", "earlier answer", TurnRole::Assistant).await.expect("append");

    let mut retrieval = MockRetrieval::new();
    retrieval.expect_retrieve().returning(|_, _| {
        Ok(vec![
            RetrievedPassage { text: "passage one".to_string(), metadata: BTreeMap::new() },
            RetrievedPassage { text: "passage two".to_string(), metadata: BTreeMap::new() },
        ])
    });
    let retrieval = RetrievalClient::new(Arc::new(retrieval));

    let turns = assemble(&db, &retrieval, RetrievalPolicy::BestEffort, 2, "111.001", "new question", true).await.expect("assemble");

    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].role, TurnRole::System);
    assert_eq!(turns[0].content, format!("{}passage one\n\npassage two", prompts::RETRIEVAL_CONTEXT_PREAMBLE));
    assert_eq!(turns[1], ChatTurn::new(TurnRole::User, "earlier question"));
    assert_eq!(turns[2], ChatTurn::new(TurnRole::Assistant, "earlier answer"));
    assert_eq!(turns[3], ChatTurn::new(TurnRole::User, "new question"));
}

#[tokio::test]
async fn assembly_without_retrieval_has_no_system_turn() {
    let db = DbClient::memory().await.expect("memory db");

    let retrieval = RetrievalClient::new(Arc::new(MockRetrieval::new()));

    let turns = assemble(&db, &retrieval, RetrievalPolicy::BestEffort, 2, "111.001", "hello", false).await.expect("assemble");

    assert_eq!(turns, vec![ChatTurn::new(TurnRole::User, "hello")]);
}

#[tokio::test]
async fn retrieval_failure_degrades_gracefully_under_best_effort() {
    let db = DbClient::memory().await.expect("memory db");

    let mut retrieval = MockRetrieval::new();
    retrieval.expect_retrieve().returning(|_, _| Err(BotError::RetrievalUnavailable(anyhow::anyhow!("similarity service down"))));
    let retrieval = RetrievalClient::new(Arc::new(retrieval));

    let turns = assemble(&db, &retrieval, RetrievalPolicy::BestEffort, 2, "111.001", "hello", true).await.expect("assemble");

    assert!(!turns.iter().any(|t| t.role == TurnRole::System));
    assert_eq!(turns.last(), Some(&ChatTurn::new(TurnRole::User, "hello")));
}

#[tokio::test]
async fn retrieval_failure_fails_the_turn_under_fatal() {
    let db = DbClient::memory().await.expect("memory db");

    let mut retrieval = MockRetrieval::new();
    retrieval.expect_retrieve().returning(|_, _| Err(BotError::RetrievalUnavailable(anyhow::anyhow!("similarity service down"))));
    let retrieval = RetrievalClient::new(Arc::new(retrieval));

    let result = assemble(&db, &retrieval, RetrievalPolicy::Fatal, 2, "111.001", "hello", true).await;

    assert!(matches!(result, Err(BotError::RetrievalUnavailable(_))));
}

// Turn pipeline.

#[tokio::test]
async fn direct_message_with_empty_text_stores_one_user_and_one_assistant_turn() {
    let db = DbClient::memory().await.expect("memory db");

    let mut llm = MockLlm::new();
    llm.expect_complete().times(1).returning(|_| Ok("Here is **help**.".to_string()));

    let mut chat = MockChat::new();
    chat.expect_bot_user_id().return_const("U0BOT".to_string());
    chat.expect_post_reply()
        .times(1)
        .withf(|channel, thread_ts, text| channel == "D024BE91L" && thread_ts == "1711111111.000100" && text == "Here is *help*.")
        .returning(|_, _, _| Ok(()));

    let ctx = context_with(test_config(false, RetrievalPolicy::BestEffort), db.clone(), llm, chat, MockRetrieval::new());

    process_turn(dm_request(""), ctx).await;

    let history = db.thread_history("1711111111.000100").await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, TurnRole::User);
    assert_eq!(history[0].content, "");
    assert_eq!(history[1].role, TurnRole::Assistant);
    assert_eq!(history[1].content, "Here is *help*.");
}

#[tokio::test]
async fn inference_failure_sends_exactly_one_error_reply() {
    let db = DbClient::memory().await.expect("memory db");

    let mut llm = MockLlm::new();
    llm.expect_complete().times(1).returning(|_| Err(BotError::InferenceFailure(anyhow::anyhow!("model unavailable"))));

    let mut chat = MockChat::new();
    chat.expect_bot_user_id().return_const("U0BOT".to_string());
    chat.expect_post_reply()
        .times(1)
        .withf(|_, _, text| text == ERROR_REPLY)
        .returning(|_, _, _| Ok(()));

    let ctx = context_with(test_config(false, RetrievalPolicy::BestEffort), db.clone(), llm, chat, MockRetrieval::new());

    process_turn(dm_request("please fail"), ctx).await;

    // The user turn was already persisted; no assistant turn follows a failure.
    let history = db.thread_history("1711111111.000100").await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, TurnRole::User);
}

#[tokio::test]
async fn retrieval_outage_does_not_block_the_reply_under_best_effort() {
    let db = DbClient::memory().await.expect("memory db");

    let mut retrieval = MockRetrieval::new();
    retrieval.expect_retrieve().times(1).returning(|_, _| Err(BotError::RetrievalUnavailable(anyhow::anyhow!("similarity service down"))));

    let mut llm = MockLlm::new();
    llm.expect_complete()
        .times(1)
        .withf(|turns| !turns.iter().any(|t| t.role == TurnRole::System))
        .returning(|_| Ok("answered anyway".to_string()));

    let mut chat = MockChat::new();
    chat.expect_bot_user_id().return_const("U0BOT".to_string());
    chat.expect_post_reply().times(1).withf(|_, _, text| text == "answered anyway").returning(|_, _, _| Ok(()));

    let ctx = context_with(test_config(true, RetrievalPolicy::BestEffort), db.clone(), llm, chat, retrieval);

    process_turn(dm_request("what do we know?"), ctx).await;

    let history = db.thread_history("1711111111.000100").await.expect("history");
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn retrieval_outage_fails_the_turn_under_fatal_policy() {
    let db = DbClient::memory().await.expect("memory db");

    let mut retrieval = MockRetrieval::new();
    retrieval.expect_retrieve().times(1).returning(|_, _| Err(BotError::RetrievalUnavailable(anyhow::anyhow!("similarity service down"))));

    let mut llm = MockLlm::new();
    llm.expect_complete().never();

    let mut chat = MockChat::new();
    chat.expect_bot_user_id().return_const("U0BOT".to_string());
    chat.expect_post_reply().times(1).withf(|_, _, text| text == ERROR_REPLY).returning(|_, _, _| Ok(()));

    let ctx = context_with(test_config(true, RetrievalPolicy::Fatal), db.clone(), llm, chat, retrieval);

    process_turn(dm_request("what do we know?"), ctx).await;

    let history = db.thread_history("1711111111.000100").await.expect("history");
    assert_eq!(history.len(), 1);
}

// Retrieval over the in-memory datastore.

#[tokio::test]
async fn passages_round_trip_through_the_vector_index() {
    let config = Config {
        inner: Arc::new(ConfigInner {
            embedding_dimension: 3,
            ..Default::default()
        }),
    };

    let db = DbClient::memory().await.expect("memory db");

    let mut llm = MockLlm::new();
    llm.expect_embed().returning(|text| {
        Ok(if text.contains("compiler") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("pasta") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.9, 0.1, 0.0]
        })
    });

    let retrieval = SurrealRetrievalClient::new(&config, db, LlmClient::new(Arc::new(llm)));

    // Bootstrapping twice must be idempotent.
    retrieval.ensure_collection().await.expect("ensure collection");
    retrieval.ensure_collection().await.expect("ensure collection again");

    let passages = vec![
        PassageRecord {
            id: Some("doc-1".to_string()),
            text: "the compiler rejects aliased mutable borrows".to_string(),
            metadata: BTreeMap::from([("topic".to_string(), "language".to_string())]),
        },
        PassageRecord {
            id: Some("doc-2".to_string()),
            text: "salt the pasta water generously".to_string(),
            metadata: BTreeMap::new(),
        },
    ];

    assert_eq!(retrieval.index_passages(&passages).await.expect("index"), 2);

    let found = retrieval.retrieve("why does the borrow fail?", 1).await.expect("retrieve");

    assert_eq!(found.len(), 1);
    assert!(found[0].text.contains("compiler"));
    assert_eq!(found[0].metadata.get("topic").map(String::as_str), Some("language"));
}
