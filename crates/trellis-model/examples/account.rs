//! A small double-entry flavored accounting model.
//!
//! A `Transaction` carries a debit or a credit and derives its balance
//! from the two. An `Account` holds a list of transactions and derives
//! its own debit, credit, and balance from theirs — so editing any
//! transaction, or the list itself, ripples up automatically.
//!
//! Run with `RUST_LOG=trellis_model=trace` to watch the engine work.

use std::sync::Arc;

use trellis_model::{Model, ModelSchema, ModelTreeDebug, Result, Value};

fn transaction_schema() -> Result<Arc<ModelSchema>> {
    ModelSchema::builder("Transaction")
        .property("debit", 0.0)
        .property("credit", 0.0)
        .computed("balance", |m| {
            let credit = m.get("credit")?.as_float().unwrap_or(0.0);
            let debit = m.get("debit")?.as_float().unwrap_or(0.0);
            Ok(Value::from(credit - debit))
        })
        .build()
}

fn account_schema() -> Result<Arc<ModelSchema>> {
    ModelSchema::builder("Account")
        .property("transactions", Vec::new())
        .computed("debit", |m| {
            Ok(Value::from(sum_over(&m, |t| {
                t.get("debit")?.as_float().ok_or_else(not_a_number)
            })?))
        })
        .computed("credit", |m| {
            Ok(Value::from(sum_over(&m, |t| {
                t.get("credit")?.as_float().ok_or_else(not_a_number)
            })?))
        })
        .computed("balance", |m| {
            let credit = m.get("credit")?.as_float().unwrap_or(0.0);
            let debit = m.get("debit")?.as_float().unwrap_or(0.0);
            Ok(Value::from(credit - debit))
        })
        .build()
}

fn not_a_number() -> trellis_model::ModelError {
    trellis_model::ModelError::generator("transaction amount is not a number")
}

/// Fold `f` over the account's transaction list. Reading each
/// transaction's attribute inside the fold is what makes the account
/// recompute when any single transaction changes.
fn sum_over(
    account: &Model,
    f: impl Fn(Model) -> Result<f64>,
) -> Result<f64> {
    let list = account.get("transactions")?;
    let mut total = 0.0;
    for item in list.as_list().unwrap_or(&[]) {
        if let Some(transaction) = item.as_model() {
            total += f(transaction)?;
        }
    }
    Ok(total)
}

fn add_transaction(account: Model, transaction: Model) -> Result<()> {
    let mut list = account
        .get("transactions")?
        .as_list()
        .unwrap_or(&[])
        .to_vec();
    list.push(Value::from(transaction));
    account.set("transactions", list)?;
    account.add_child(transaction)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let transactions = transaction_schema()?;
    let accounts = account_schema()?;

    let checking = Model::new(&accounts)?;
    checking.connect("balance-changed", |args| {
        println!("balance: {} -> {}", args[0], args[1]);
        Ok(())
    })?;

    let paycheck = Model::new(&transactions)?;
    paycheck.set("credit", 1250.0)?;
    add_transaction(checking, paycheck)?;

    let rent = Model::new(&transactions)?;
    rent.set("debit", 800.0)?;
    add_transaction(checking, rent)?;

    // Correcting a single transaction recomputes the account.
    rent.set("debit", 815.5)?;

    println!("{}", ModelTreeDebug::new(checking).format_tree()?);
    println!("final balance: {}", checking.get("balance")?);
    Ok(())
}
