//! CLI definition and dispatch.
//!
//! The binary stands in for the excluded controller layer: it builds order
//! commands from arguments, feeds them through the command history, and
//! renders the results. The `trade` subcommand runs an interactive session
//! where undo/redo operate across several orders.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use crate::adapters::csv_adapter::read_stock_listings;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_adapter::MemoryLedgerStore;
use crate::domain::command::{CommandHistory, OrderCommand};
use crate::domain::engine::OrderEngine;
use crate::domain::error::{LedgerError, OrderError};
use crate::domain::market::{MarketNewsFeed, PriceObserver};
use crate::domain::stock::{sort_stocks, NewStock, Stock, StockKind, StockSort};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerStore;

#[derive(Parser, Debug)]
#[command(name = "stockbook", about = "Stock trading ledger with undo/redo")]
pub struct Cli {
    /// Path to the INI configuration file
    #[arg(short, long, global = true, default_value = "stockbook.ini")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the ledger schema
    Init,
    /// Import stock listings from a CSV file (symbol,name,kind,price)
    ImportStocks {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List a new stock
    AddStock {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        name: String,
        /// equity, bond or etf
        #[arg(long, default_value = "equity")]
        kind: String,
        #[arg(long)]
        price: Decimal,
    },
    /// Create a user account
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        balance: Decimal,
    },
    /// Show the stock catalogue
    ListStocks {
        /// Ordering: symbol, price-asc or price-desc
        #[arg(long, default_value = "symbol")]
        sort: String,
    },
    /// Show a user's balance and positions
    Portfolio {
        #[arg(long)]
        user: i64,
    },
    /// Show a user's transaction ledger
    Transactions {
        #[arg(long)]
        user: i64,
    },
    /// Execute a buy order
    Buy {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        stock: i64,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        price: Decimal,
    },
    /// Execute a sell order
    Sell {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        stock: i64,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        price: Decimal,
    },
    /// Interactive trading session with undo/redo
    Trade,
}

pub fn run(cli: Cli) -> ExitCode {
    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let backend = config
        .get_string("ledger", "backend")
        .unwrap_or_else(|| "sqlite".to_string());

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            match crate::adapters::sqlite_adapter::SqliteLedgerStore::from_config(&config) {
                Ok(store) => dispatch(store, cli.command),
                Err(err) => fail_store(&err),
            }
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            match crate::adapters::postgres_adapter::PostgresLedgerStore::from_config(&config) {
                Ok(store) => dispatch(store, cli.command),
                Err(err) => fail_store(&err),
            }
        }
        "memory" => dispatch(demo_store(&config), cli.command),
        other => {
            let err = LedgerError::ConfigInvalid {
                section: "ledger".into(),
                key: "backend".into(),
                reason: format!("unsupported backend '{other}'"),
            };
            fail_store(&err)
        }
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = LedgerError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Throwaway in-memory ledger preloaded with a demo user and a few
/// listings, for kicking the tyres without a database.
fn demo_store(config: &dyn ConfigPort) -> MemoryLedgerStore {
    let store = MemoryLedgerStore::new();
    let balance = config.get_decimal("demo", "starting_balance", Decimal::new(1_000_000, 2));

    let listings = [
        NewStock::new(StockKind::Equity, "BHP", "BHP Group", Decimal::new(4410, 2)),
        NewStock::new(StockKind::Equity, "CBA", "Commonwealth Bank", Decimal::new(11000, 2)),
        NewStock::new(
            StockKind::Etf,
            "VAS",
            "Vanguard Australian Shares",
            Decimal::new(9520, 2),
        ),
    ];
    for listing in &listings {
        if let Err(err) = store.insert_stock(listing) {
            log::warn!("demo listing {} skipped: {err}", listing.symbol);
        }
    }
    if let Err(err) = store.insert_user("demo", balance) {
        log::warn!("demo user skipped: {err}");
    }
    eprintln!("demo ledger: user 1 'demo' holding {balance}; stocks BHP, CBA, VAS");
    store
}

fn dispatch<S: LedgerStore>(store: S, command: Command) -> ExitCode {
    match command {
        Command::Init => run_init(store),
        Command::ImportStocks { file } => run_import_stocks(store, &file),
        Command::AddStock {
            symbol,
            name,
            kind,
            price,
        } => run_add_stock(store, &symbol, &name, &kind, price),
        Command::AddUser { name, balance } => run_add_user(store, &name, balance),
        Command::ListStocks { sort } => run_list_stocks(store, &sort),
        Command::Portfolio { user } => run_portfolio(&store, user),
        Command::Transactions { user } => run_transactions(store, user),
        Command::Buy {
            user,
            stock,
            quantity,
            price,
        } => run_order(store, OrderCommand::buy(user, stock, quantity, price)),
        Command::Sell {
            user,
            stock,
            quantity,
            price,
        } => run_order(store, OrderCommand::sell(user, stock, quantity, price)),
        Command::Trade => run_trade_session(store),
    }
}

fn fail_store(err: &LedgerError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn fail_order(err: &OrderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn run_init<S: LedgerStore>(store: S) -> ExitCode {
    match store.initialize() {
        Ok(()) => {
            println!("ledger schema ready");
            ExitCode::SUCCESS
        }
        Err(err) => fail_store(&err),
    }
}

fn run_import_stocks<S: LedgerStore>(store: S, file: &PathBuf) -> ExitCode {
    let listings = match read_stock_listings(file) {
        Ok(listings) => listings,
        Err(err) => return fail_store(&err),
    };

    for listing in &listings {
        if let Err(err) = store.insert_stock(listing) {
            return fail_store(&err);
        }
    }
    println!("imported {} stocks from {}", listings.len(), file.display());
    ExitCode::SUCCESS
}

fn run_add_stock<S: LedgerStore>(
    store: S,
    symbol: &str,
    name: &str,
    kind: &str,
    price: Decimal,
) -> ExitCode {
    let Some(kind) = StockKind::parse(kind) else {
        return fail_order(&OrderError::InvalidArgument {
            reason: format!("unknown stock kind '{kind}'"),
        });
    };
    if price <= Decimal::ZERO {
        return fail_order(&OrderError::InvalidArgument {
            reason: format!("price must be positive, got {price}"),
        });
    }

    match store.insert_stock(&NewStock::new(kind, symbol, name, price)) {
        Ok(id) => {
            println!("listed stock {id}: {symbol}");
            ExitCode::SUCCESS
        }
        Err(err) => fail_store(&err),
    }
}

fn run_add_user<S: LedgerStore>(store: S, name: &str, balance: Decimal) -> ExitCode {
    if balance < Decimal::ZERO {
        return fail_order(&OrderError::InvalidArgument {
            reason: format!("balance must be non-negative, got {balance}"),
        });
    }
    match store.insert_user(name, balance) {
        Ok(id) => {
            println!("created user {id}: {name}");
            ExitCode::SUCCESS
        }
        Err(err) => fail_store(&err),
    }
}

fn run_list_stocks<S: LedgerStore>(store: S, sort: &str) -> ExitCode {
    let sort = match sort {
        "symbol" => StockSort::SymbolAscending,
        "price-asc" => StockSort::PriceAscending,
        "price-desc" => StockSort::PriceDescending,
        other => {
            return fail_order(&OrderError::InvalidArgument {
                reason: format!("unknown sort '{other}'"),
            });
        }
    };

    let mut stocks = match store.list_stocks() {
        Ok(stocks) => stocks,
        Err(err) => return fail_store(&err),
    };
    sort_stocks(&mut stocks, sort);

    for stock in &stocks {
        println!(
            "{:>4}  {:<8} {:<36} {:<7} {:>12}",
            stock.id,
            stock.symbol,
            stock.name,
            stock.kind.as_str(),
            stock.current_price
        );
    }
    ExitCode::SUCCESS
}

fn run_portfolio<S: LedgerStore>(store: &S, user_id: i64) -> ExitCode {
    let user = match store.get_user(user_id) {
        Ok(Some(user)) => user,
        Ok(None) => return fail_order(&OrderError::UserNotFound { user_id }),
        Err(err) => return fail_store(&err),
    };

    let positions = match store.positions_for_user(user_id) {
        Ok(positions) => positions,
        Err(err) => return fail_store(&err),
    };

    println!("user {}: {} (balance {})", user.id, user.name, user.balance);
    let mut holdings_value = Decimal::ZERO;
    for position in &positions {
        let stock = match store.get_stock(position.stock_id) {
            Ok(Some(stock)) => stock,
            Ok(None) => continue,
            Err(err) => return fail_store(&err),
        };
        let value = position.market_value(stock.current_price);
        holdings_value += value;
        println!(
            "  {:<8} {:>8} shares @ {:>10} = {:>12}",
            stock.symbol, position.quantity, stock.current_price, value
        );
    }
    println!("holdings value: {holdings_value}");
    ExitCode::SUCCESS
}

fn run_transactions<S: LedgerStore>(store: S, user_id: i64) -> ExitCode {
    let transactions = match store.transactions_for_user(user_id) {
        Ok(transactions) => transactions,
        Err(err) => return fail_store(&err),
    };

    for tx in &transactions {
        println!(
            "{:>6}  {}  {:<4} {:>8} of stock {:<4} @ {:>10} = {:>12}",
            tx.id,
            tx.executed_at.format("%Y-%m-%d %H:%M:%S"),
            tx.direction.as_str(),
            tx.quantity,
            tx.stock_id,
            tx.price,
            tx.gross_amount()
        );
    }
    ExitCode::SUCCESS
}

fn run_order<S: LedgerStore>(store: S, command: OrderCommand) -> ExitCode {
    let mut engine = match OrderEngine::new(store) {
        Ok(engine) => engine,
        Err(err) => return fail_order(&err),
    };
    engine.board_mut().attach(Rc::new(TickerTape));

    let mut history = CommandHistory::new();
    let description = command.description();
    match history.execute(&mut engine, command) {
        Ok(()) => {
            println!("executed: {description}");
            ExitCode::SUCCESS
        }
        Err(err) => fail_order(&err),
    }
}

/// Prints each price change, like the dashboard ticker in a trading UI.
struct TickerTape;

impl PriceObserver for TickerTape {
    fn on_price_update(&self, stock: &Stock) -> Result<(), LedgerError> {
        eprintln!("[ticker] {} {}", stock.symbol, stock.current_price);
        Ok(())
    }
}

fn run_trade_session<S: LedgerStore>(store: S) -> ExitCode {
    let mut engine = match OrderEngine::new(store) {
        Ok(engine) => engine,
        Err(err) => return fail_order(&err),
    };
    let news = Rc::new(MarketNewsFeed::new(32));
    engine.board_mut().attach(news.clone());
    engine.board_mut().attach(Rc::new(TickerTape));

    let mut history = CommandHistory::new();

    println!("stockbook trading session. type 'help' for commands, 'quit' to leave");
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error: {err}");
                break;
            }
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = parts.split_first() else {
            continue;
        };

        match verb {
            "quit" | "exit" => break,
            "help" => print_session_help(),
            "buy" | "sell" => match parse_session_order(verb, args) {
                Ok(command) => {
                    let description = command.description();
                    match history.execute(&mut engine, command) {
                        Ok(()) => println!("executed: {description}"),
                        Err(err) => println!("rejected: {err}"),
                    }
                }
                Err(usage) => println!("{usage}"),
            },
            "undo" => {
                let pending = history.executed().last().map(|c| c.description());
                match pending {
                    Some(description) => {
                        if history.undo(&mut engine) {
                            println!("undone: {description}");
                        } else {
                            println!("undo failed: {description}");
                        }
                    }
                    None => println!("nothing to undo"),
                }
            }
            "redo" => {
                let pending = history.undone().last().map(|c| c.description());
                match pending {
                    Some(description) => {
                        if history.redo(&mut engine) {
                            println!("redone: {description}");
                        } else {
                            println!("redo failed: {description}");
                        }
                    }
                    None => println!("nothing to redo"),
                }
            }
            "history" => {
                if history.undo_depth() == 0 && history.redo_depth() == 0 {
                    println!("history is empty");
                }
                for command in history.executed() {
                    println!("  done:   {}", command.description());
                }
                for command in history.undone() {
                    println!("  undone: {}", command.description());
                }
            }
            "news" => {
                let headlines = news.headlines();
                if headlines.is_empty() {
                    println!("no market news yet");
                }
                for headline in headlines {
                    println!("  {headline}");
                }
            }
            "stocks" => match engine.store().list_stocks() {
                Ok(stocks) => {
                    for stock in stocks {
                        println!(
                            "  {:>4}  {:<8} {:>12}",
                            stock.id, stock.symbol, stock.current_price
                        );
                    }
                }
                Err(err) => println!("error: {err}"),
            },
            "portfolio" => match args.first().map(|raw| raw.parse::<i64>()) {
                Some(Ok(user_id)) => {
                    let _ = run_portfolio(engine.store(), user_id);
                }
                _ => println!("usage: portfolio <user>"),
            },
            other => println!("unknown command '{other}', type 'help'"),
        }
    }
    ExitCode::SUCCESS
}

fn parse_session_order(verb: &str, args: &[&str]) -> Result<OrderCommand, String> {
    let usage = format!("usage: {verb} <user> <stock> <quantity> <price>");
    if args.len() != 4 {
        return Err(usage);
    }
    let user = args[0].parse::<i64>().map_err(|_| usage.clone())?;
    let stock = args[1].parse::<i64>().map_err(|_| usage.clone())?;
    let quantity = args[2].parse::<i64>().map_err(|_| usage.clone())?;
    let price = args[3].parse::<Decimal>().map_err(|_| usage.clone())?;

    Ok(if verb == "buy" {
        OrderCommand::buy(user, stock, quantity, price)
    } else {
        OrderCommand::sell(user, stock, quantity, price)
    })
}

fn print_session_help() {
    println!("  buy <user> <stock> <quantity> <price>   execute a buy order");
    println!("  sell <user> <stock> <quantity> <price>  execute a sell order");
    println!("  undo                                    reverse the newest order");
    println!("  redo                                    replay the newest undone order");
    println!("  history                                 show the command timeline");
    println!("  news                                    show recent price headlines");
    println!("  stocks                                  show the catalogue");
    println!("  portfolio <user>                        show balance and positions");
    println!("  quit                                    leave the session");
}
