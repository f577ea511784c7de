fn main() { println!("{}", cryogonal::constants::USER_AGENT); }
