#![no_main]
use libfuzzer_sys::fuzz_target;
use montecarlo_chess::chess::ChessState;
use montecarlo_chess::game::GameState;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(state) = ChessState::from_fen(s) {
            let reparsed = ChessState::from_fen(state.fen()).unwrap();
            assert_eq!(state, reparsed);
            assert_eq!(state.is_terminal(), state.successors().is_empty());
            for next in state.successors() {
                let _ = state.move_to(&next).unwrap();
            }
        }
    }
});
