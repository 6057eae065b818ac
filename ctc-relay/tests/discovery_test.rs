//! Chain discovery against simulated chains of various lengths.

use std::time::Duration;

use ctc_relay::transport::mock::MockTransport;
use ctc_relay::transport::sim::{BoardState, SimulatedChain, FIRMWARE_VERSION};
use ctc_relay::{AddressSpec, Command, CommandResult, Dispatcher, Error, Malformed};
use test_case::test_case;

const TIMEOUT: Duration = Duration::from_millis(300);

async fn init(link: &mut impl ctc_relay::Transport) -> ctc_relay::Result<CommandResult> {
    Dispatcher::new(link, TIMEOUT)
        .execute(Command::InitChain, AddressSpec::Sole)
        .await
}

#[tokio::test(start_paused = true)]
async fn test_empty_chain() {
    let mut chain = SimulatedChain::new(0);
    assert!(matches!(init(&mut chain).await, Err(Error::NoBoardFound)));
}

#[test_case(1 ; "single board")]
#[test_case(5 ; "five boards")]
#[test_case(31 ; "full chain")]
#[tokio::test(start_paused = true)]
async fn test_chain_of(n: usize) {
    let mut chain = SimulatedChain::new(n);
    let result = init(&mut chain).await.unwrap();

    let CommandResult::Chain { boards } = result else {
        panic!("expected chain table");
    };
    let expected: Vec<u8> = (1..=n as u8).collect();
    assert_eq!(boards.addresses(), expected);
    assert!(boards.boards().iter().all(|b| b.firmware == FIRMWARE_VERSION));

    for (i, board) in chain.boards().iter().enumerate() {
        assert_eq!(board.state(), BoardState::Assigned(i as u8 + 1));
    }
}

#[tokio::test(start_paused = true)]
async fn test_overflowing_chain() {
    let mut chain = SimulatedChain::new(32);
    match init(&mut chain).await {
        Err(Error::ChainOverflow { assigned }) => {
            assert_eq!(assigned.len(), 31);
            assert_eq!(assigned.addresses(), (1..=31).collect::<Vec<u8>>());
        }
        other => panic!("expected overflow, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_init_can_be_repeated() {
    let mut chain = SimulatedChain::new(2);
    init(&mut chain).await.unwrap();
    let again = init(&mut chain).await.unwrap();
    assert!(matches!(again, CommandResult::Chain { boards } if boards.len() == 2));
}

#[tokio::test(start_paused = true)]
async fn test_open_ring_ends_on_timeout() {
    // Acks for two boards, then the claim is lost instead of looping back.
    let mut link = MockTransport::new()
        .reply(vec![254, 1, 3, 254 ^ 1 ^ 3])
        .reply(vec![254, 2, 4, 254 ^ 2 ^ 4])
        .silence();
    let result = init(&mut link).await.unwrap();

    let CommandResult::Chain { boards } = result else {
        panic!("expected chain table");
    };
    assert_eq!(boards.addresses(), vec![1, 2]);
    let firmware: Vec<u8> = boards.boards().iter().map(|b| b.firmware).collect();
    assert_eq!(firmware, vec![3, 4]);
    assert_eq!(link.written(), &[vec![1, 1, 0, 0]]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_chain_is_no_board_found() {
    let mut link = MockTransport::new().silence();
    assert!(matches!(init(&mut link).await, Err(Error::NoBoardFound)));
}

#[tokio::test(start_paused = true)]
async fn test_skipped_address_is_malformed() {
    let mut link = MockTransport::new()
        .reply(vec![254, 1, 3, 254 ^ 1 ^ 3])
        .reply(vec![254, 5, 3, 254 ^ 5 ^ 3]);
    assert!(matches!(
        init(&mut link).await,
        Err(Error::MalformedResponse(Malformed::AddressMismatch {
            expected: 2,
            actual: 5
        }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_garbled_ack_is_malformed() {
    let mut link = MockTransport::new().reply(vec![254, 1, 3, 0]);
    assert!(matches!(
        init(&mut link).await,
        Err(Error::MalformedResponse(Malformed::Checksum { .. }))
    ));
}
