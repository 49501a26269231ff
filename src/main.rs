use duel_2048::agent::Agent;
use duel_2048::engine::GridEngine;

fn main() {
    let engine = GridEngine::classic();
    let mut agent = Agent::new(engine.clone());
    let mut rng = rand::thread_rng();
    let mut state = engine.new_game(&mut rng);
    println!("{}", state.grid);
    let mut move_count = 0;
    let mut nodes = 0;
    while !state.is_over() {
        let direction = agent.best_move(&state.grid, &mut rng);
        nodes += agent.last_stats().nodes;
        move_count += 1;
        state = engine.apply_move(state, direction, &mut rng);
        println!("{}", state.grid);
    }
    println!(
        "Moves made: {}, Score: {}, States considered: {}, Max states considered for a move: {}",
        move_count,
        state.score,
        nodes,
        agent.last_stats().peak_nodes
    )
}
