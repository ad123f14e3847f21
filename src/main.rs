use std::sync::Arc;

use heapdb::common::Config;
use heapdb::execution::{
    collect_tuples, Aggregate, AggregateOp, CompareOp, Join, JoinPredicate, OpIterator, SeqScan,
};
use heapdb::tuple::{DataType, TupleBuilder, TupleDesc};
use heapdb::Database;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = std::env::temp_dir().join(format!("heapdb-demo-{}", std::process::id()));
    std::fs::create_dir_all(&data_dir)?;
    info!(dir = %data_dir.display(), "starting demo");

    let db = Database::new(Config::default().with_buffer_pool_pages(16))?;

    let emp_desc = TupleDesc::builder()
        .field("id", DataType::Integer)
        .field("dept", DataType::Integer)
        .field("salary", DataType::Integer)
        .build_arc();
    let dept_desc = TupleDesc::builder()
        .field("id", DataType::Integer)
        .field("name", DataType::VarChar(16))
        .build_arc();

    let emp = db.create_table("emp", data_dir.join("emp.dat"), Arc::clone(&emp_desc))?;
    let dept = db.create_table("dept", data_dir.join("dept.dat"), Arc::clone(&dept_desc))?;

    let tid = db.begin_transaction();
    for (id, name) in [(1i32, "eng"), (2, "sales"), (3, "ops")] {
        let tuple = TupleBuilder::new(Arc::clone(&dept_desc))
            .value(id)
            .value(name)
            .build()?;
        db.buffer_pool().insert_tuple(tid, dept, tuple)?;
    }
    for i in 0..30i32 {
        let tuple = TupleBuilder::new(Arc::clone(&emp_desc))
            .value(i)
            .value(i % 3 + 1)
            .value(1000 + i * 10)
            .build()?;
        db.buffer_pool().insert_tuple(tid, emp, tuple)?;
    }
    db.commit(tid)?;

    let tid = db.begin_transaction();
    let pool = Arc::clone(db.buffer_pool());

    let mut join = Join::new(
        JoinPredicate::new(1, CompareOp::Equals, 0),
        Box::new(SeqScan::new(Arc::clone(&pool), tid, emp, "e")?),
        Box::new(SeqScan::new(Arc::clone(&pool), tid, dept, "d")?),
    );
    join.open()?;
    let joined = collect_tuples(&mut join)?;
    join.close();
    println!("emp JOIN dept: {} rows, columns {}", joined.len(), join.tuple_desc());

    let mut avg = Aggregate::new(
        Box::new(SeqScan::new(Arc::clone(&pool), tid, emp, "e")?),
        2,
        Some(1),
        AggregateOp::Avg,
    )?;
    avg.open()?;
    println!("{}", avg.tuple_desc());
    for row in collect_tuples(&mut avg)? {
        println!("  {}", row);
    }
    avg.close();
    db.commit(tid)?;

    std::fs::remove_dir_all(&data_dir).ok();
    info!("demo completed");
    Ok(())
}
