//! Integration tests for the trading ledger.
//!
//! Tests cover:
//! - The end-to-end buy/undo scenario: balance, position, ledger entries,
//!   listed price and observer notifications after each step
//! - Rejected orders leaving no trace (insufficient funds/holdings)
//! - Undo/redo round trips and redo invalidation by fresh commands
//! - Observer fan-out: ordering, detach, failure isolation
//! - The same order flow against the SQLite adapter, in-memory and
//!   file-backed across a reopen
//! - Property: Buy then Sell at identical arguments is the identity on
//!   balance and holdings

mod common;

use common::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::rc::Rc;
use stockbook::domain::command::{CommandHistory, OrderCommand};
use stockbook::domain::error::OrderError;
use stockbook::domain::transaction::TradeDirection;
use stockbook::ports::ledger_port::LedgerStore;

mod trading_scenarios {
    use super::*;

    #[test]
    fn buy_then_undo_walks_the_balance_and_position_back() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let observer = RecordingObserver::new();
        engine.board_mut().attach(observer.clone());
        let mut history = CommandHistory::new();

        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 50, dec!(10.00)))
            .unwrap();

        assert_eq!(
            snapshot(&engine, user, stock),
            StateSnapshot {
                balance: dec!(500.00),
                quantity: 50,
                transaction_count: 1,
                listed_price: dec!(10.00),
            }
        );
        assert_eq!(observer.count(), 1);

        assert!(history.undo(&mut engine));

        let after_undo = snapshot(&engine, user, stock);
        assert_eq!(after_undo.balance, dec!(1000.00));
        assert_eq!(after_undo.quantity, 0);
        // The reversal appended a Sell entry; nothing was erased.
        assert_eq!(after_undo.transaction_count, 2);
        let ledger = engine.store().transactions_for_user(user).unwrap();
        assert_eq!(ledger[0].direction, TradeDirection::Buy);
        assert_eq!(ledger[1].direction, TradeDirection::Sell);
        assert_eq!(observer.count(), 2);
    }

    #[test]
    fn underfunded_buy_is_rejected_without_side_effects() {
        let (mut engine, user, stock) = seeded_engine(dec!(5.00), dec!(10.00));
        let observer = RecordingObserver::new();
        engine.board_mut().attach(observer.clone());
        let mut history = CommandHistory::new();

        let err = history
            .execute(&mut engine, OrderCommand::buy(user, stock, 1, dec!(10.00)))
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientFunds { .. }));

        assert_eq!(
            snapshot(&engine, user, stock),
            StateSnapshot {
                balance: dec!(5.00),
                quantity: 0,
                transaction_count: 0,
                listed_price: dec!(10.00),
            }
        );
        assert_eq!(observer.count(), 0);
        assert_eq!(history.undo_depth(), 0);
    }

    #[test]
    fn overdrawn_sell_is_rejected_without_side_effects() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let mut history = CommandHistory::new();

        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 5, dec!(10.00)))
            .unwrap();
        let before = snapshot(&engine, user, stock);

        let err = history
            .execute(&mut engine, OrderCommand::sell(user, stock, 6, dec!(10.00)))
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientHoldings { requested: 6, held: 5 }
        ));
        assert_eq!(snapshot(&engine, user, stock), before);
    }
}

mod undo_redo_flow {
    use super::*;

    #[test]
    fn undo_then_redo_lands_on_the_post_execute_state() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let mut history = CommandHistory::new();

        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 20, dec!(12.50)))
            .unwrap();
        let after_execute = snapshot(&engine, user, stock);

        assert!(history.undo(&mut engine));
        assert!(history.redo(&mut engine));

        let after_redo = snapshot(&engine, user, stock);
        assert_eq!(after_redo.balance, after_execute.balance);
        assert_eq!(after_redo.quantity, after_execute.quantity);
        assert_eq!(after_redo.listed_price, after_execute.listed_price);
        // Undo and redo each appended their own ledger entry.
        assert_eq!(after_redo.transaction_count, 3);
    }

    #[test]
    fn fresh_command_after_undo_invalidates_redo() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let mut history = CommandHistory::new();

        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 10, dec!(10.00)))
            .unwrap();
        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 20, dec!(10.00)))
            .unwrap();
        assert!(history.undo(&mut engine));
        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 5, dec!(10.00)))
            .unwrap();

        assert!(!history.redo(&mut engine));
        assert_eq!(
            engine
                .store()
                .get_position(user, stock)
                .unwrap()
                .unwrap()
                .quantity,
            15
        );
    }

    #[test]
    fn sell_commands_undo_back_into_holdings() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let mut history = CommandHistory::new();

        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 30, dec!(10.00)))
            .unwrap();
        history
            .execute(&mut engine, OrderCommand::sell(user, stock, 30, dec!(15.00)))
            .unwrap();
        assert_eq!(snapshot(&engine, user, stock).balance, dec!(1150.00));

        // Undo the sell: shares come back at the sell price.
        assert!(history.undo(&mut engine));
        let state = snapshot(&engine, user, stock);
        assert_eq!(state.balance, dec!(700.00));
        assert_eq!(state.quantity, 30);
    }
}

mod observer_fanout {
    use super::*;

    #[test]
    fn every_attached_observer_sees_each_committed_order() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let first = RecordingObserver::new();
        let second = RecordingObserver::new();
        engine.board_mut().attach(first.clone());
        engine.board_mut().attach(second.clone());

        engine.buy(user, stock, 10, dec!(11.00)).unwrap();
        engine.sell(user, stock, 10, dec!(12.00)).unwrap();

        let expected = vec![
            ("BHP".to_string(), dec!(11.00)),
            ("BHP".to_string(), dec!(12.00)),
        ];
        assert_eq!(*first.updates.borrow(), expected);
        assert_eq!(*second.updates.borrow(), expected);
    }

    #[test]
    fn detached_observer_stops_hearing_updates() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let observer = RecordingObserver::new();
        let id = engine.board_mut().attach(observer.clone());

        engine.buy(user, stock, 1, dec!(10.00)).unwrap();
        assert!(engine.board_mut().detach(id));
        engine.buy(user, stock, 1, dec!(10.00)).unwrap();

        assert_eq!(observer.count(), 1);
    }

    #[test]
    fn failing_observer_neither_fails_the_order_nor_blocks_peers() {
        let (mut engine, user, stock) = seeded_engine(dec!(1000.00), dec!(10.00));
        let witness = RecordingObserver::new();
        engine.board_mut().attach(Rc::new(FailingObserver));
        engine.board_mut().attach(witness.clone());

        engine.buy(user, stock, 10, dec!(10.00)).unwrap();

        assert_eq!(snapshot(&engine, user, stock).balance, dec!(900.00));
        assert_eq!(witness.count(), 1);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_backend {
    use super::*;
    use stockbook::adapters::file_config_adapter::FileConfigAdapter;
    use stockbook::adapters::sqlite_adapter::SqliteLedgerStore;
    use stockbook::domain::engine::OrderEngine;

    #[test]
    fn order_flow_commits_through_sqlite() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store.initialize().unwrap();
        let (user, stock) = seed_store(&store, dec!(1000.00), dec!(10.00));

        let mut engine = OrderEngine::new(store).unwrap();
        let observer = RecordingObserver::new();
        engine.board_mut().attach(observer.clone());
        let mut history = CommandHistory::new();

        history
            .execute(&mut engine, OrderCommand::buy(user, stock, 50, dec!(10.00)))
            .unwrap();
        assert_eq!(
            snapshot(&engine, user, stock),
            StateSnapshot {
                balance: dec!(500.00),
                quantity: 50,
                transaction_count: 1,
                listed_price: dec!(10.00),
            }
        );

        assert!(history.undo(&mut engine));
        let state = snapshot(&engine, user, stock);
        assert_eq!(state.balance, dec!(1000.00));
        assert_eq!(state.quantity, 0);
        assert_eq!(state.transaction_count, 2);
        assert_eq!(observer.count(), 2);
    }

    #[test]
    fn rejected_orders_roll_back_in_sqlite() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store.initialize().unwrap();
        let (user, stock) = seed_store(&store, dec!(5.00), dec!(10.00));

        let mut engine = OrderEngine::new(store).unwrap();
        assert!(matches!(
            engine.buy(user, stock, 1, dec!(10.00)),
            Err(OrderError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            engine.sell(user, stock, 1, dec!(10.00)),
            Err(OrderError::InsufficientHoldings { .. })
        ));

        let state = snapshot(&engine, user, stock);
        assert_eq!(state.balance, dec!(5.00));
        assert_eq!(state.transaction_count, 0);
    }

    #[test]
    fn ledger_survives_a_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");
        let config = FileConfigAdapter::from_string(&format!(
            "[sqlite]\npath = {}\npool_size = 1\n",
            db_path.display()
        ))
        .unwrap();

        let (user, stock) = {
            let store = SqliteLedgerStore::from_config(&config).unwrap();
            store.initialize().unwrap();
            let (user, stock) = seed_store(&store, dec!(1000.00), dec!(10.00));
            let mut engine = OrderEngine::new(store).unwrap();
            engine.buy(user, stock, 50, dec!(10.00)).unwrap();
            (user, stock)
        };

        let reopened = SqliteLedgerStore::from_config(&config).unwrap();
        assert_eq!(
            reopened.get_user(user).unwrap().unwrap().balance,
            dec!(500.00)
        );
        assert_eq!(
            reopened.get_position(user, stock).unwrap().unwrap().quantity,
            50
        );
        let ledger = reopened.transactions_for_user(user).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].direction, TradeDirection::Buy);
        assert_eq!(
            reopened.get_stock(stock).unwrap().unwrap().current_price,
            dec!(10.00)
        );
    }
}

mod inverse_law {
    use super::*;

    proptest! {
        #[test]
        fn buy_then_sell_is_the_identity_on_balance_and_holdings(
            quantity in 1i64..500,
            price_cents in 1i64..10_000,
            spare_cents in 0i64..100_000,
        ) {
            let price = Decimal::new(price_cents, 2);
            let balance = Decimal::new(quantity * price_cents + spare_cents, 2);
            let (mut engine, user, stock) = seeded_engine(balance, price);

            engine.buy(user, stock, quantity, price).unwrap();
            engine.sell(user, stock, quantity, price).unwrap();

            let store = engine.store();
            prop_assert_eq!(store.get_user(user).unwrap().unwrap().balance, balance);
            prop_assert!(store.get_position(user, stock).unwrap().is_none());
            prop_assert_eq!(store.transactions_for_user(user).unwrap().len(), 2);
        }

        #[test]
        fn underfunded_buys_never_move_state(
            quantity in 1i64..500,
            price_cents in 1i64..10_000,
            shortfall_cents in 1i64..100,
        ) {
            let price = Decimal::new(price_cents, 2);
            let cost_cents = quantity * price_cents;
            prop_assume!(cost_cents > shortfall_cents);
            let balance = Decimal::new(cost_cents - shortfall_cents, 2);
            let (mut engine, user, stock) = seeded_engine(balance, price);

            let err = engine.buy(user, stock, quantity, price).unwrap_err();
            prop_assert!(
                matches!(err, OrderError::InsufficientFunds { .. }),
                "expected InsufficientFunds error"
            );
            prop_assert_eq!(engine.store().get_user(user).unwrap().unwrap().balance, balance);
            prop_assert!(engine.store().transactions_for_user(user).unwrap().is_empty());
        }
    }
}
