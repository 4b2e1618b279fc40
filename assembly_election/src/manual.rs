/*!

This is the long-form manual for `assembly_election` and `avote`.

## How an election runs

An election elects a fixed list of offices, one after the other, in a fixed order. By default
the offices are:

1. President
2. Vice-President
3. First Secretary
4. Second Secretary
5. Treasurer

Creating an election makes it the only active election: any previous election is deactivated.
Every office starts `pending`, becomes `active` when it is opened, and ends `completed`. Only one
office of an election may be active at a time.

### Attendance

Members are marked present or absent for the whole election. When an office opens, the members
present at that moment are frozen into the attendance roll of that office. The size of this
roll is the _quorum_ of the office: it stays the same for every round of the office, even if
members arrive or leave afterwards. Only members of the frozen roll may stand for the office or
vote for it.

An office cannot be opened while nobody is present.

### Candidacies

A member may stand for the office that is currently open, provided that:
- the member is not an administrator,
- the member is in the frozen roll of the office,
- the member has not already won another office of the same election,
- the member is not already a candidate for this office.

### Rounds

Each office is voted on in up to three rounds (scrutinies). Every present member casts at most
one ballot per round. Nothing is decided before every member of the frozen roll has voted in the
round.

- **Rounds 1 and 2** require an absolute majority: a candidate wins with at least
  `floor(quorum / 2) + 1` votes. If nobody reaches it, an administrator advances the office to
  the next round. The candidates and the ballots of the previous rounds are kept.
- **Round 3** only keeps the two best candidates of round 2. Ballots for the others are deleted.
  The candidate with the most votes wins. If two candidates share the lead, the office stays
  open until an administrator declares the winner.

An administrator may also complete an office without a winner, or simply open the next office,
which completes the current one. Both are recorded in the audit log with the reason. When no
office is left to open, opening the next one changes nothing.

An administrator declaring a winner does so for the current round of the office.

### Closing and archiving

Closing an election completes all its offices, including those never voted on. An election
that a newer one deactivated can still be closed, which resolves the office it left open. An election can
only be archived (finalized) when all its offices are completed. Archiving deletes the ballots
and the candidacies; the winners and the final counts of each office are kept and the results
remain available.

## Session scripts

The `avote` program replays a recorded assembly session written in JSON and prints the results.
A script has three sections:

```json
{
  "sessionSettings": {
    "electionName": "Annual assembly",
    "offices": ["President", "Treasurer"]
  },
  "members": [
    { "fullName": "Ana Lima", "email": "ana@example.org" },
    { "fullName": "Rui Costa", "email": "rui@example.org", "admin": true }
  ],
  "steps": [
    { "action": "createElection" },
    { "action": "markPresent", "members": [1, 2] },
    { "action": "openNext" },
    { "action": "addCandidate", "office": "President", "member": 1 },
    { "action": "cast", "office": "President", "candidate": 1, "voters": [1, 2] }
  ]
}
```

`offices` is optional and defaults to the five offices above. Members are referred to by their
position in the `members` list, starting at 1. Offices are referred to by name, and candidates
by the member standing.

### Steps

| action                 | fields                                    |
|------------------------|-------------------------------------------|
| `createElection`       | `name` (optional, defaults to `electionName`) |
| `initializeAttendance` |                                           |
| `markPresent`          | `members`, `present` (optional, default `true`) |
| `openOffice`           | `office`                                  |
| `openNext`             |                                           |
| `addCandidate`         | `office`, `member`                        |
| `cast`                 | `office`, `candidate`, `voters`           |
| `advanceRound`         | `office`                                  |
| `setWinner`            | `office`, `candidate`, `round`            |
| `forceComplete`        | `office`, `reason` (optional)             |
| `close`                |                                           |
| `finalize`             |                                           |

Every step accepts an optional `expect` field naming the error the step must fail with, for
example `"expect": "DuplicateVote"`. A step that fails when nothing was expected, or that does
not fail as expected, stops the replay. For a `cast` step with several voters, the expectation
applies to every ballot of the step.

The error names are: `OfficeNotOpen`, `IneligibleRole`, `NotPresent`, `AlreadyElected`,
`DuplicateCandidacy`, `DuplicateVote`, `OfficeAlreadyOpenElsewhere`, `NoPendingOffice`,
`IncompleteElection`, `NotFound`, `InvalidTransition`, `EmptyQuorum`, `ElectionClosed`,
`ElectionArchived`, `InvalidRules`.

### Output

The summary contains the settings of the session and one entry per office, in voting order:
its status, current round, quorum, majority threshold, whether the round is undecided, the
winner and the round it won in, and the votes of each candidate.

Pass `--reference` with a previously saved summary to check that a session still produces the
same results. Any difference is printed and the program fails.
*/
