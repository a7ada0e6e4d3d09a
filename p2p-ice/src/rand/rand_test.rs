use super::*;
use crate::description::{
    ICE_PWD_MAX_LENGTH, ICE_PWD_MIN_LENGTH, ICE_UFRAG_MAX_LENGTH, ICE_UFRAG_MIN_LENGTH,
};
use shared::error::Result;

#[test]
fn test_random_generator_collision() -> Result<()> {
    let test_cases: Vec<(&str, fn() -> String)> = vec![
        ("CandidateID", generate_cand_id),
        ("PWD", generate_pwd),
        ("Ufrag", generate_ufrag),
    ];

    const N: usize = 10;
    const ITERATION: usize = 10;

    for (name, generate) in test_cases {
        for _ in 0..ITERATION {
            let rs: Vec<String> = (0..N).map(|_| generate()).collect();

            assert_eq!(rs.len(), N, "{name} Failed to generate randoms");

            for i in 0..N {
                for j in i + 1..N {
                    assert_ne!(
                        rs[i], rs[j],
                        "{}: generateRandString caused collision: {} == {}",
                        name, rs[i], rs[j],
                    );
                }
            }
        }
    }

    Ok(())
}

#[test]
fn test_generated_credentials_are_valid() {
    let ufrag = generate_ufrag();
    let pwd = generate_pwd();
    assert!((ICE_UFRAG_MIN_LENGTH..=ICE_UFRAG_MAX_LENGTH).contains(&ufrag.len()));
    assert!((ICE_PWD_MIN_LENGTH..=ICE_PWD_MAX_LENGTH).contains(&pwd.len()));
}
