use arbitrary::Unstructured;
use arbtest::{arbitrary, arbtest};
use persistent_vector::{Const, Transient, ValidBranchingConstant, Vector};

#[derive(arbitrary::Arbitrary, Debug)]
enum Op {
    Conj(u32),
    Assoc(usize, u32),
    Extend(Vec<u32>),
    // Keep the current version around, to check later that nothing changed it.
    Snapshot,
    // Run a batch of updates through a transient.
    Transient(Vec<TransientOp>),
}

#[derive(arbitrary::Arbitrary, Debug)]
enum TransientOp {
    Push(u32),
    Set(usize, u32),
}

impl Op {
    fn apply_to_vec(&self, vec: &mut Vec<u32>) {
        match self {
            Op::Conj(x) => vec.push(*x),
            Op::Assoc(idx, x) => {
                if !vec.is_empty() {
                    let len = vec.len();
                    vec[idx % len] = *x;
                }
            }
            Op::Extend(xs) => vec.extend_from_slice(xs),
            Op::Snapshot => {}
            Op::Transient(ops) => {
                for op in ops {
                    match op {
                        TransientOp::Push(x) => vec.push(*x),
                        TransientOp::Set(idx, x) => {
                            if !vec.is_empty() {
                                let len = vec.len();
                                vec[idx % len] = *x;
                            }
                        }
                    }
                }
            }
        }
    }

    fn apply_to_vector<const N: usize>(
        &self,
        vec: &mut Vector<u32, N>,
        arena: &mut Vec<(Vector<u32, N>, Vec<u32>)>,
    ) where
        Const<N>: ValidBranchingConstant,
    {
        match self {
            Op::Conj(x) => *vec = vec.conj(*x),
            Op::Assoc(idx, x) => {
                if !vec.is_empty() {
                    *vec = vec.assoc(idx % vec.len(), *x).unwrap();
                }
            }
            Op::Extend(xs) => vec.extend(xs.iter().copied()),
            Op::Snapshot => {
                arena.push((vec.clone(), vec.iter().copied().collect()));
            }
            Op::Transient(ops) => {
                let mut transient = vec.transient();
                for op in ops {
                    match op {
                        TransientOp::Push(x) => transient.push(*x),
                        TransientOp::Set(idx, x) => {
                            if !transient.is_empty() {
                                let len = transient.len();
                                transient.set(idx % len, *x).unwrap();
                            }
                        }
                    }
                    transient.check_invariants();
                }
                *vec = transient.persistent();
            }
        }
    }
}

// u.arbitrary() generates very short vecs by default:
// https://github.com/matklad/arbtest/issues/8
fn arb_vec(u: &mut Unstructured<'_>) -> arbitrary::Result<Vec<u32>> {
    let len = u.arbitrary_len::<u32>()?;
    std::iter::from_fn(|| Some(u.arbitrary::<u32>()))
        .take(len)
        .collect()
}

fn mutations<const N: usize>()
where
    Const<N>: ValidBranchingConstant,
{
    arbtest(|u| {
        let mut vec: Vec<u32> = arb_vec(u)?;
        let mut vector: Vector<u32, N> = vec.iter().copied().collect();
        let mut arena = Vec::new();
        let ops: Vec<Op> = u.arbitrary()?;

        for op in ops {
            op.apply_to_vec(&mut vec);
            op.apply_to_vector(&mut vector, &mut arena);

            vector.check_invariants();
            assert_eq!(vec, vector.iter().copied().collect::<Vec<_>>());
        }

        for (old, contents) in arena {
            old.check_invariants();
            assert_eq!(contents, old.iter().copied().collect::<Vec<_>>());
        }

        Ok(())
    });
}

#[test]
fn mutations_narrow() {
    mutations::<2>();
}

#[test]
fn mutations_medium() {
    mutations::<4>();
}

#[test]
fn mutations_wide() {
    mutations::<32>();
}

#[test]
fn builder_matches_conj() {
    arbtest(|u| {
        let vec: Vec<u32> = arb_vec(u)?;
        let built: Vector<u32, 4> = vec.iter().copied().collect();
        let conjed = vec
            .iter()
            .fold(Vector::<u32, 4>::new(), |acc, x| acc.conj(*x));

        built.check_invariants();
        conjed.check_invariants();
        assert_eq!(built, conjed);
        assert_eq!(built.to_string(), conjed.to_string());

        Ok(())
    });
}

#[test]
fn into_iter() {
    arbtest(|u| {
        let vec: Vec<u32> = arb_vec(u)?;
        let vector: Vector<u32, 4> = vec.iter().copied().collect();

        let result: Vec<u32> = vector.clone().into_iter().collect();
        assert_eq!(result, vec);

        let mut reversed: Vec<u32> = vector.into_iter().rev().collect();
        reversed.reverse();
        assert_eq!(reversed, vec);

        Ok(())
    });
}

#[test]
fn transient_reads() {
    arbtest(|u| {
        let vec: Vec<u32> = arb_vec(u)?;
        let transient: Transient<u32, 8> = vec.iter().copied().collect();

        assert_eq!(transient.len(), vec.len());
        assert_eq!(transient.peek().ok(), vec.last());
        for (i, x) in vec.iter().enumerate() {
            assert_eq!(transient.nth(i), Ok(x));
        }
        assert!(transient.nth(vec.len()).is_err());
        assert_eq!(vec, transient.iter().copied().collect::<Vec<_>>());

        Ok(())
    });
}
