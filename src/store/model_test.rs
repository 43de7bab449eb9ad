use std::collections::BTreeMap;

use rand::Rng;

use crate::{fs::MockDir, import::Table, schema::Record, Error};

use super::SortedRecordStore;

#[derive(Debug, Clone)]
enum Op {
    Insert(u64, String),
    Update(u64, String),
    Delete(u64),
    Find(u64),
    Reload,
}

fn random_op(rng: &mut impl Rng) -> Op {
    let key = rng.gen_range(0..1000);
    let name = "v".repeat(rng.gen_range(1..=5));
    match rng.gen_range(0..10) {
        0..=4 => Op::Insert(key, name),
        5 => Op::Update(key, name),
        6 => Op::Delete(key),
        7 | 8 => Op::Find(key),
        9 => Op::Reload,
        _ => unreachable!(),
    }
}

// Every record in the file, in slot order, checked against the key ordering
// the store promises.
fn check_sorted(store: &mut SortedRecordStore<MockDir>, ops: &[Op]) -> Vec<(u64, String)> {
    let records = store.scan_first_n(usize::MAX).unwrap();
    let keyed: Vec<(u64, String)> = records
        .into_iter()
        .map(|r| (r.key().unwrap(), r.get(1).unwrap().to_owned()))
        .collect();
    for pair in keyed.windows(2) {
        assert!(
            pair[0].0 < pair[1].0,
            "keys out of order after {:?}: {:?}",
            ops,
            keyed
        );
    }
    keyed
}

fn run(ops: &[Op]) {
    let dir = MockDir::new();
    let mut store = SortedRecordStore::new(dir.clone()).unwrap();
    let table = Table::parse("id,name\n500,vvvvv\n".as_bytes()).unwrap();
    store.import_data("model", table).unwrap();
    store.open().unwrap();

    let mut model = BTreeMap::new();
    model.insert(500, "vvvvv".to_owned());

    for (i, op) in ops.iter().enumerate() {
        let history = &ops[..=i];
        match op {
            Op::Insert(k, v) => {
                let record = Record::from(vec![format!("{:03}", k), v.clone()]);
                match store.insert(record) {
                    Ok(_) => assert!(model.insert(*k, v.clone()).is_none(), "{:?}", history),
                    Err(Error::DuplicateKey(dup)) => {
                        assert_eq!(*k, dup);
                        assert!(model.contains_key(k), "{:?}", history);
                    }
                    Err(e) => panic!("{}: {:?}", e, history),
                }
            }
            Op::Update(k, v) => match store.find(*k) {
                Ok((index, record)) => {
                    store.update(index, &record, "name", v).unwrap();
                    model.insert(*k, v.clone());
                }
                Err(Error::RecordNotFound(_)) => assert!(!model.contains_key(k), "{:?}", history),
                Err(e) => panic!("{}: {:?}", e, history),
            },
            Op::Delete(k) => match store.find(*k) {
                Ok((index, _)) => {
                    store.delete(index).unwrap();
                    model.remove(k);
                }
                Err(Error::RecordNotFound(_)) => assert!(!model.contains_key(k), "{:?}", history),
                Err(e) => panic!("{}: {:?}", e, history),
            },
            Op::Find(k) => {
                let found = store.find(*k).ok().map(|(_, r)| r.get(1).unwrap().to_owned());
                assert_eq!(model.get(k).cloned(), found, "{:?}", history);
            }
            Op::Reload => {
                store = SortedRecordStore::new(dir.clone()).unwrap();
                store.open().unwrap();
            }
        }

        let expected: Vec<(u64, String)> = model.iter().map(|(k, v)| (*k, v.clone())).collect();
        assert_eq!(expected, check_sorted(&mut store, history));
    }
}

#[test]
fn model_test() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let ops: Vec<Op> = (0..100).map(|_| random_op(&mut rng)).collect();
        run(&ops);
    }
}

#[test]
fn model_test_dense_keys() {
    // Few distinct keys force repeated rewrites and duplicate rejections.
    let mut ops = Vec::new();
    for k in (490..510).rev() {
        ops.push(Op::Insert(k, "x".to_owned()));
        ops.push(Op::Find(k));
    }
    for k in (490..510).step_by(3) {
        ops.push(Op::Delete(k));
    }
    ops.push(Op::Reload);
    for k in 490..510 {
        ops.push(Op::Insert(k, "yy".to_owned()));
    }
    run(&ops);
}
