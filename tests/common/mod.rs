#![allow(dead_code)]

use spandb::{
    Column, Context, Error, Executor, MemoryExecutor, Result, ResultSet, Session, SessionConfig,
    Statement, ToValue, Transaction, Type, TypeCode, executor::MemoryScope,
    storage::memory::MemoryEngine,
};

pub type Albums = Session<MemoryExecutor<MemoryEngine>>;
pub type Txn = Transaction<MemoryScope<MemoryEngine>>;

pub const SELECT_BUDGET: &str = "SELECT MarketingBudget FROM Albums \
     WHERE SingerId = @singerId AND AlbumId = @albumId";
pub const UPDATE_BUDGET: &str = "UPDATE Albums SET MarketingBudget = @budget \
     WHERE SingerId = @singerId AND AlbumId = @albumId";
pub const INSERT_ALBUM: &str = "INSERT INTO Albums (SingerId, AlbumId, MarketingBudget) \
     VALUES (@singerId, @albumId, @budget)";

pub fn failed(message: &str) -> Error {
    Error::ExecutionFailed {
        index: None,
        message: message.to_string(),
    }
}

fn album_key(stmt: &Statement) -> Result<Vec<spandb::Value>> {
    Ok(vec![
        stmt.param::<i64>("singerId")?.to_value()?,
        stmt.param::<i64>("albumId")?.to_value()?,
    ])
}

/// Albums(SingerId, AlbumId, MarketingBudget) keyed by (SingerId, AlbumId)
pub fn albums(config: SessionConfig) -> Albums {
    MemoryExecutor::new(MemoryEngine::new())
        .with_query(SELECT_BUDGET, |tables, stmt| {
            let column = Column::new("MarketingBudget", Type::Scalar(TypeCode::Int64));
            let mut result = ResultSet::new(vec![column]);
            if let Some(row) = tables.get("Albums", &album_key(stmt)?)? {
                result.push(vec![row[2].clone()])?;
            }
            Ok(result)
        })
        .with_update(UPDATE_BUDGET, |tables, stmt| {
            let key = album_key(stmt)?;
            let Some(mut row) = tables.get("Albums", &key)? else {
                return Ok(0);
            };
            row[2] = stmt.param::<Option<i64>>("budget")?.to_value()?;
            tables.put("Albums", &key, row)?;
            Ok(1)
        })
        .with_update(INSERT_ALBUM, |tables, stmt| {
            let key = album_key(stmt)?;
            let budget = stmt.param::<Option<i64>>("budget")?.to_value()?;
            let row = vec![key[0].clone(), key[1].clone(), budget];
            tables.insert("Albums", &key, row)?;
            Ok(1)
        })
        .session(config)
}

pub fn insert_album(singer: i64, album: i64, budget: Option<i64>) -> Result<Statement> {
    Statement::builder(INSERT_ALBUM)
        .bind("singerId", singer)
        .bind("albumId", album)
        .bind("budget", budget)
        .build()
}

pub fn update_budget(singer: i64, album: i64, budget: i64) -> Result<Statement> {
    Statement::builder(UPDATE_BUDGET)
        .bind("singerId", singer)
        .bind("albumId", album)
        .bind("budget", budget)
        .build()
}

/// Albums (1, 1) and (2, 2) with the given budgets
pub fn seeded(budget1: i64, budget2: i64) -> Result<Albums> {
    let ctx = Context::background();
    let session = albums(SessionConfig::default());
    let mut txn = session.open_transaction(&ctx)?;
    let mut batch = txn.new_batch()?;
    batch
        .append(insert_album(1, 1, Some(budget1))?)?
        .append(insert_album(2, 2, Some(budget2))?)?;
    batch.submit_expecting(&ctx, 2)?;
    txn.commit(&ctx)?;
    Ok(session)
}

pub fn read_budget(txn: &mut Txn, ctx: &Context, singer: i64, album: i64) -> Result<i64> {
    let stmt = Statement::builder(SELECT_BUDGET)
        .bind("singerId", singer)
        .bind("albumId", album)
        .build()?;
    match txn.read(ctx, &stmt)?.next() {
        Some(row) => Ok(row.get::<Option<i64>>(0)?.unwrap_or(0)),
        None => Err(failed("album not found")),
    }
}

/// Moves `amount` from album (2, 2) to album (1, 1) if (2, 2) can afford it
///
/// Returns the batch counts, or `None` when nothing was written.
pub fn transfer(txn: &mut Txn, ctx: &Context, amount: i64) -> Result<Option<Vec<i64>>> {
    let budget2 = read_budget(txn, ctx, 2, 2)?;
    if budget2 < amount {
        return Ok(None);
    }
    let budget1 = read_budget(txn, ctx, 1, 1)?;

    let mut batch = txn.new_batch()?;
    batch
        .append(update_budget(1, 1, budget1 + amount)?)?
        .append(update_budget(2, 2, budget2 - amount)?)?;
    batch.submit_expecting(ctx, 2).map(Some)
}

/// Budgets of (1, 1) and (2, 2) as seen by a fresh transaction
pub fn budgets(session: &Albums) -> Result<(i64, i64)> {
    let ctx = Context::background();
    let mut txn = session.open_transaction(&ctx)?;
    let budgets = (read_budget(&mut txn, &ctx, 1, 1)?, read_budget(&mut txn, &ctx, 2, 2)?);
    txn.commit(&ctx)?;
    Ok(budgets)
}
