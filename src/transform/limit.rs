use log::info;

use crate::{Circuit, Error, NodeOpts, Result};

fn check_limit(k: usize) -> Result<()> {
    if k < 2 {
        Err(Error::Precondition(format!(
            "Fanin and fanout limits must be at least 2, got {}",
            k
        )))
    } else {
        Ok(())
    }
}

/// Limit the fanin of every gate to `k`
///
/// Excess fanins are grouped two by two in new gates `{n}_limit_fanin_{i}`, of the
/// positive kind of the gate.
pub fn limit_fanin(c: &Circuit, k: usize) -> Result<Circuit> {
    check_limit(k)?;
    let mut ret = c.clone();
    let mut nb_added = 0;
    for n in c.node_weights() {
        if !n.kind.is_gate() {
            continue;
        }
        let mut i = 0;
        loop {
            let fanin: Vec<String> = ret.fanin([&n.name])?.into_iter().collect();
            if fanin.len() <= k {
                break;
            }
            let pair = &fanin[fanin.len() - 2..];
            ret.disconnect(pair, [&n.name])?;
            let g = ret.uid(&format!("{}_limit_fanin_{}", n.name, i));
            ret.add_with(
                &g,
                n.kind.positive(),
                NodeOpts::new().fanin(pair).fanout([&n.name]),
            )?;
            i += 1;
            nb_added += 1;
        }
    }
    info!("Limited fanin of {} to {}: {} gates added", c.name(), k, nb_added);
    Ok(ret)
}

/// Limit the fanout of every node to `k`
///
/// Excess fanouts are driven two by two through new buffers `{n}_limit_fanout_{i}`.
pub fn limit_fanout(c: &Circuit, k: usize) -> Result<Circuit> {
    check_limit(k)?;
    let mut ret = c.clone();
    let mut nb_added = 0;
    for n in c.node_weights() {
        let mut i = 0;
        loop {
            let fanout: Vec<String> = ret.fanout([&n.name])?.into_iter().collect();
            if fanout.len() <= k {
                break;
            }
            let pair = &fanout[fanout.len() - 2..];
            ret.disconnect([&n.name], pair)?;
            let b = ret.uid(&format!("{}_limit_fanout_{}", n.name, i));
            ret.add_with(
                &b,
                crate::NodeKind::Buf,
                NodeOpts::new().fanin([&n.name]).fanout(pair),
            )?;
            i += 1;
            nb_added += 1;
        }
    }
    info!("Limited fanout of {} to {}: {} buffers added", c.name(), k, nb_added);
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::solve;
    use crate::transform::miter;
    use crate::NodeKind;

    fn wide() -> Circuit {
        let mut c = Circuit::new("wide");
        let inputs: Vec<String> = (0..7).map(|i| format!("i{}", i)).collect();
        for i in &inputs {
            c.add(i, NodeKind::Input).unwrap();
        }
        for (n, kind) in [
            ("and", NodeKind::And),
            ("nand", NodeKind::Nand),
            ("nor", NodeKind::Nor),
            ("xnor", NodeKind::Xnor),
        ] {
            c.add_with(n, kind, NodeOpts::new().fanin(&inputs).output(true))
                .unwrap();
        }
        c
    }

    #[test]
    fn test_limit_fanin() {
        let c = wide();
        for k in [2, 3, 5] {
            let l = limit_fanin(&c, k).unwrap();
            for n in l.nodes() {
                if l.kind(&n).unwrap().is_gate() {
                    assert!(l.nb_fanin(&n).unwrap() <= k, "{} has too many fanins", n);
                }
            }
            assert_eq!(l.kind("xnor_limit_fanin_0").unwrap(), NodeKind::Xor);
            let m = miter(&c, Some(&l), None, None).unwrap();
            assert!(solve(&m, [("sat", true)]).unwrap().is_none());
        }
        assert!(matches!(limit_fanin(&c, 1), Err(Error::Precondition(_))));
    }

    #[test]
    fn test_limit_fanout() {
        let c = wide();
        let l = limit_fanout(&c, 2).unwrap();
        for n in l.nodes() {
            assert!(l.nb_fanout(&n).unwrap() <= 2, "{} has too many fanouts", n);
        }
        let m = miter(&c, Some(&l), None, None).unwrap();
        assert!(solve(&m, [("sat", true)]).unwrap().is_none());
        assert!(limit_fanout(&c, 0).is_err());
    }
}
