// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use drv_sdi_api::{BusError, ResourceKind, SdiError};
use drv_sdi_server::Board;
use proptest::prelude::*;

const BOARD: &str = r#"
    [nvram.config]
    size = 256
    page-size = 16

    [host-system.board]
    slot = 6

    [host-system.legacy]
    slot = 1
    unsupported = ["booted"]
"#;

#[test]
fn whole_part_and_edges() {
    let board = Board::from_toml(BOARD).unwrap();
    let sdi = board.sdi();
    let nv = board.handle(ResourceKind::Nvram, "config").unwrap();
    let port = board.nvram_port("config").unwrap();

    assert_eq!(sdi.nvram_size(nv), Ok(256));

    let mut all = [0u8; 256];
    sdi.nvram_read(nv, &mut all, 0).unwrap();
    assert_eq!(all, [0xff; 256]);

    let mut tail = [0x11u8; 10];
    assert_eq!(
        sdi.nvram_read(nv, &mut tail, 250),
        Err(SdiError::NotPermitted)
    );
    assert_eq!(tail, [0x11; 10]);

    let data: Vec<u8> = (0..56).collect();
    sdi.nvram_write(nv, &data, 200).unwrap();
    let mut back = [0u8; 56];
    sdi.nvram_read(nv, &mut back, 200).unwrap();
    assert_eq!(&back[..], &data[..]);

    let before = port.contents();
    assert!(sdi.nvram_write(nv, &data, 201).is_err());
    assert!(sdi.nvram_write(nv, &[0], 256).is_err());
    assert!(sdi.nvram_write(nv, &[0], u32::MAX).is_err());
    assert_eq!(port.contents(), before);

    // Empty accesses inside the part are allowed, past it they are not.
    sdi.nvram_read(nv, &mut [], 256).unwrap();
    assert!(sdi.nvram_read(nv, &mut [], 257).is_err());
}

#[test]
fn failed_write_rolls_back() {
    let board = Board::from_toml(BOARD).unwrap();
    let sdi = board.sdi();
    let nv = board.handle(ResourceKind::Nvram, "config").unwrap();
    let port = board.nvram_port("config").unwrap();

    sdi.nvram_write(nv, b"calibration v1", 32).unwrap();
    let before = port.contents();

    port.fail_after_writes(Some(2));
    assert_eq!(
        sdi.nvram_write(nv, &[0u8; 64], 24),
        Err(SdiError::NotPermitted)
    );
    assert_eq!(port.contents(), before);
}

#[test]
fn bus_fault_surfaces() {
    let board = Board::from_toml(BOARD).unwrap();
    let sdi = board.sdi();
    let nv = board.handle(ResourceKind::Nvram, "config").unwrap();
    let port = board.nvram_port("config").unwrap();

    port.inject_fault(Some(BusError::Timeout));
    assert!(sdi.nvram_read(nv, &mut [0; 4], 0).is_err());
    assert!(sdi.nvram_write(nv, &[0; 4], 0).is_err());
    port.inject_fault(None);
    assert_eq!(port.contents(), vec![0xff; 256]);
}

#[test]
fn host_system() {
    let board = Board::from_toml(BOARD).unwrap();
    let sdi = board.sdi();
    let hs = board.handle(ResourceKind::HostSystem, "board").unwrap();
    let port = board.host_system_port("board").unwrap();

    assert_eq!(sdi.host_system_slot_pos_get(hs), Ok(6));
    port.set_slot(2);
    assert_eq!(sdi.host_system_slot_pos_get(hs), Ok(2));

    assert!(!port.booted());
    sdi.host_system_booted_set(hs, true).unwrap();
    assert!(port.booted());
    sdi.host_system_booted_set(hs, true).unwrap();
    assert!(port.booted());
    sdi.host_system_booted_set(hs, false).unwrap();
    assert!(!port.booted());

    let legacy = board.handle(ResourceKind::HostSystem, "legacy").unwrap();
    assert_eq!(sdi.host_system_slot_pos_get(legacy), Ok(1));
    assert_eq!(
        sdi.host_system_booted_set(legacy, true),
        Err(SdiError::NotPermitted)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn access_is_all_or_nothing(
        ofs in 0u32..300,
        data in proptest::collection::vec(any::<u8>(), 0..80),
    ) {
        let board = Board::from_toml(BOARD).unwrap();
        let sdi = board.sdi();
        let nv = board.handle(ResourceKind::Nvram, "config").unwrap();
        let port = board.nvram_port("config").unwrap();

        let before = port.contents();
        let fits = ofs as usize + data.len() <= 256;
        let r = sdi.nvram_write(nv, &data, ofs);
        prop_assert_eq!(r.is_ok(), fits);

        let after = port.contents();
        if fits {
            let range = ofs as usize..ofs as usize + data.len();
            prop_assert_eq!(&after[range.clone()], &data[..]);
            prop_assert_eq!(&after[..range.start], &before[..range.start]);
            prop_assert_eq!(&after[range.end..], &before[range.end..]);

            let mut back = vec![0; data.len()];
            prop_assert_eq!(sdi.nvram_read(nv, &mut back, ofs), Ok(()));
            prop_assert_eq!(back, data);
        } else {
            prop_assert_eq!(after, before);
            let mut back = vec![0x33; data.len()];
            prop_assert!(sdi.nvram_read(nv, &mut back, ofs).is_err());
            prop_assert_eq!(back, vec![0x33; data.len()]);
        }
    }
}
