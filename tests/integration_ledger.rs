//! End-to-end tests for the ledger core over the in-memory engine:
//! command handling, event store ordering, projections and queries.

use std::sync::Arc;

use ledger_core::{
    Account, AccountCommand, AccountFilter, AccountStatus, Aggregate, CommandHandler, EventStore,
    LedgerError, QueryError,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

mod common;

async fn open_account(ledger: &common::TestLedger, holder: &str, initial: rust_decimal::Decimal) -> Uuid {
    let outcome = ledger
        .handler
        .handle(AccountCommand::OpenAccount {
            holder_name: holder.to_string(),
            initial_balance: initial,
        })
        .await
        .expect("open account");
    outcome.account_id
}

#[tokio::test]
async fn test_open_deposit_withdraw_yields_expected_state() {
    // Scenario: open with 100, deposit 50, withdraw 30
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(100)).await;

    ledger
        .handler
        .handle(AccountCommand::Deposit {
            account_id,
            amount: dec!(50),
            expected_version: None,
        })
        .await
        .unwrap();

    let outcome = ledger
        .handler
        .handle(AccountCommand::Withdraw {
            account_id,
            amount: dec!(30),
            expected_version: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.new_version, 3);

    // Rebuild the aggregate from the log and check the derived state
    let events = ledger.store.load_events(account_id).await.unwrap();
    assert_eq!(events.len(), 3);
    let account = Account::rebuild(
        events
            .iter()
            .map(|e| e.decode().unwrap())
            .collect::<Vec<_>>(),
    );
    assert_eq!(account.balance().value(), dec!(120));
    assert_eq!(account.version(), 3);
    assert_eq!(account.status(), AccountStatus::Active);
}

#[tokio::test]
async fn test_overdraw_rejected_and_nothing_appended() {
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(100)).await;
    ledger
        .handler
        .handle(AccountCommand::Deposit {
            account_id,
            amount: dec!(20),
            expected_version: None,
        })
        .await
        .unwrap();

    let result = ledger
        .handler
        .handle(AccountCommand::Withdraw {
            account_id,
            amount: dec!(200),
            expected_version: None,
        })
        .await;

    match result {
        Err(LedgerError::Validation(domain)) => {
            assert_eq!(domain.code(), "insufficient_funds");
        }
        other => panic!("expected insufficient funds, got {:?}", other),
    }

    // Balance unchanged, no event appended
    let events = ledger.store.load_events(account_id).await.unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_deposit_after_close_rejected() {
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(100)).await;

    ledger
        .handler
        .handle(AccountCommand::CloseAccount {
            account_id,
            expected_version: None,
        })
        .await
        .unwrap();

    let result = ledger
        .handler
        .handle(AccountCommand::Deposit {
            account_id,
            amount: dec!(10),
            expected_version: None,
        })
        .await;

    match result {
        Err(LedgerError::Validation(domain)) => {
            assert_eq!(domain.code(), "inactive_account");
        }
        other => panic!("expected inactive account, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rebuild_all_produces_consistent_summary() {
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(100)).await;

    for command in [
        AccountCommand::Deposit {
            account_id,
            amount: dec!(50),
            expected_version: None,
        },
        AccountCommand::Withdraw {
            account_id,
            amount: dec!(30),
            expected_version: None,
        },
    ] {
        ledger.handler.handle(command).await.unwrap();
    }

    // Full replay from offset 0
    let applied = ledger.engine.rebuild_all().await.unwrap();
    assert_eq!(applied, 3);

    let summary = ledger.query.get_account(account_id).await.unwrap();
    assert_eq!(summary.balance, dec!(120));
    assert_eq!(summary.status, AccountStatus::Active);
    assert_eq!(summary.version, 3);
}

#[tokio::test]
async fn test_concurrent_overdraws_never_both_succeed() {
    // Two withdrawals that together exceed the balance: exactly one may
    // commit, whichever interleaving occurs
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(120)).await;

    let withdraw = |handler: Arc<CommandHandler>| async move {
        handler
            .handle(AccountCommand::Withdraw {
                account_id,
                amount: dec!(80),
                expected_version: None,
            })
            .await
    };

    let handler = Arc::new(CommandHandler::new(ledger.store.clone()));
    let (first, second) = tokio::join!(
        tokio::spawn(withdraw(handler.clone())),
        tokio::spawn(withdraw(handler.clone()))
    );
    let results = [first.unwrap(), second.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one withdrawal may commit");

    for result in &results {
        if let Err(e) = result {
            assert!(
                e.is_conflict() || e.code() == "insufficient_funds",
                "loser must fail with a conflict or insufficient funds, got {:?}",
                e
            );
        }
    }

    // The committed history never overdraws
    let events = ledger.store.load_events(account_id).await.unwrap();
    let account = Account::rebuild(
        events
            .iter()
            .map(|e| e.decode().unwrap())
            .collect::<Vec<_>>(),
    );
    assert_eq!(account.balance().value(), dec!(40));
}

#[tokio::test]
async fn test_stale_direct_append_conflicts() {
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(120)).await;

    // Two handlers observe version 1, both decide, first append wins
    let events = ledger.store.load_events(account_id).await.unwrap();
    let account = Account::rebuild(
        events
            .iter()
            .map(|e| e.decode().unwrap())
            .collect::<Vec<_>>(),
    );
    let amount = ledger_core::Amount::new(dec!(80)).unwrap();

    let first = account.withdraw(&amount).unwrap();
    let second = account.withdraw(&amount).unwrap();

    use ledger_core::domain::PendingEvent;
    ledger
        .store
        .append(
            account_id,
            account.version(),
            vec![PendingEvent::try_from(&first).unwrap()],
        )
        .await
        .unwrap();

    let stale = ledger
        .store
        .append(
            account_id,
            account.version(),
            vec![PendingEvent::try_from(&second).unwrap()],
        )
        .await;
    assert!(stale.is_err(), "stale expected version must be rejected");
}

#[tokio::test]
async fn test_live_projection_feed_serves_queries() {
    let ledger = common::setup_ledger();

    // Start the projection consumer before issuing commands
    let engine = ledger.engine.clone();
    let receiver = ledger.store.subscribe();
    let consumer = tokio::spawn(async move { engine.run(receiver).await });

    let account_id = open_account(&ledger, "Jane", dec!(100)).await;
    ledger
        .handler
        .handle(AccountCommand::Deposit {
            account_id,
            amount: dec!(50),
            expected_version: None,
        })
        .await
        .unwrap();

    // Reads are eventually consistent; poll until the projection catches up
    let summary = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            match ledger.query.get_account(account_id).await {
                Ok(summary) if summary.version >= 2 => return summary,
                _ => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
        }
    })
    .await
    .expect("projection did not catch up in time");

    assert_eq!(summary.balance, dec!(150));
    consumer.abort();
}

#[tokio::test]
async fn test_queries_never_touch_unprojected_accounts() {
    let ledger = common::setup_ledger();
    let account_id = open_account(&ledger, "Jane", dec!(100)).await;

    // The event exists, but the projection has not consumed it yet
    assert!(matches!(
        ledger.query.get_account(account_id).await,
        Err(QueryError::NotFound(_))
    ));

    ledger.engine.catch_up().await.unwrap();
    assert!(ledger.query.get_account(account_id).await.is_ok());
}

#[tokio::test]
async fn test_list_accounts_over_several_aggregates() {
    let ledger = common::setup_ledger();
    open_account(&ledger, "Alice", dec!(10)).await;
    open_account(&ledger, "Bob", dec!(20)).await;
    let closed = open_account(&ledger, "Carol", dec!(30)).await;
    ledger
        .handler
        .handle(AccountCommand::CloseAccount {
            account_id: closed,
            expected_version: None,
        })
        .await
        .unwrap();

    ledger.engine.catch_up().await.unwrap();

    let all = ledger.query.list_accounts(&AccountFilter::default()).await;
    assert_eq!(all.len(), 3);

    let active = ledger
        .query
        .list_accounts(&AccountFilter {
            status: Some(AccountStatus::Active),
            holder_contains: None,
        })
        .await;
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|s| s.status == AccountStatus::Active));
}
